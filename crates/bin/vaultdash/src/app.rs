//! main egui application state

use std::collections::VecDeque;
use std::time::Duration;

use eframe::egui::{self, Color32, RichText};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use vault_session::{
    Action, ActionKind, ContractConnector, FormInputs, InputField, Notice, SessionController,
    SessionPhase, Snapshot, Variant, WalletProvider,
};

const ERROR_COLOR: Color32 = Color32::from_rgb(200, 110, 100);
const MUTED: Color32 = Color32::from_rgb(152, 152, 157);

pub struct Dashboard<P: WalletProvider, C: ContractConnector> {
    controller: SessionController<P, C>,
    notices: mpsc::UnboundedReceiver<Notice>,
    listener: Option<JoinHandle<()>>,

    // last state seen by the render loop
    snapshot: Option<Snapshot>,
    /// blocking notices, oldest first
    pending_notices: VecDeque<Notice>,

    // UI state
    form: FormInputs,
    variant: Variant,
    input_error: Option<String>,

    // runtime
    runtime: tokio::runtime::Runtime,
}

impl<P: WalletProvider, C: ContractConnector> Dashboard<P, C> {
    pub fn new(
        runtime: tokio::runtime::Runtime,
        controller: SessionController<P, C>,
        notices: mpsc::UnboundedReceiver<Notice>,
    ) -> Self {
        let listener = runtime.block_on(controller.start());
        let variant = controller.config().variant;

        Self {
            controller,
            notices,
            listener,
            snapshot: None,
            pending_notices: VecDeque::new(),
            form: FormInputs::default(),
            variant,
            input_error: None,
            runtime,
        }
    }

    fn poll_state(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            if let Notice::Completed { action, .. } = &notice {
                self.form.clear_for(*action);
            }
            self.pending_notices.push_back(notice);
        }

        if let Some(snapshot) = self.controller.try_snapshot() {
            self.snapshot = Some(snapshot);
        }
    }

    fn connect(&self) {
        let controller = self.controller.clone();
        self.runtime.spawn(async move {
            if let Err(e) = controller.connect().await {
                debug!("connect failed: {}", e);
            }
        });
    }

    fn trigger(&mut self, kind: ActionKind) {
        match self.form.action_for(self.variant, kind) {
            Ok(action) => {
                self.input_error = None;
                self.submit(action);
            }
            Err(e) => self.input_error = Some(e.to_string()),
        }
    }

    fn submit(&self, action: Action) {
        let controller = self.controller.clone();
        self.runtime.spawn(async move {
            if let Err(e) = controller.execute(action).await {
                debug!("action failed: {}", e);
            }
        });
    }

    fn render_install(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.label(RichText::new("no wallet provider").size(22.0));
            ui.add_space(12.0);
            ui.label(
                RichText::new("Please install a wallet provider in order to use this dashboard.")
                    .color(MUTED),
            );
            ui.label(
                RichText::new(format!("looked for a node at {}", self.controller.config().rpc_endpoint))
                    .small()
                    .color(MUTED),
            );
        });
    }

    fn render_connect(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.label(RichText::new("vault").size(22.0));
            ui.add_space(24.0);
            if ui.button("connect wallet").clicked() {
                self.connect();
            }
        });
    }

    fn render_binding(&mut self, ui: &mut egui::Ui, snapshot: &Snapshot) {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.spinner();
            if let Some(account) = snapshot.session.account() {
                ui.label(format!("binding contract for {}", account.short()));
            }
        });
    }

    fn render_dashboard(&mut self, ui: &mut egui::Ui, snapshot: &Snapshot) {
        let view = &snapshot.view;

        ui.horizontal(|ui| {
            if let Some(account) = snapshot.session.account() {
                ui.label(RichText::new(account.to_string()).monospace());
            }
            if snapshot.pending_writes > 0 {
                ui.spinner();
                ui.label(RichText::new(format!("{} pending", snapshot.pending_writes)).color(MUTED));
            }
        });
        ui.add_space(8.0);

        let balance = view
            .balance
            .map(|b| b.format_units())
            .unwrap_or_else(|| "…".into());
        ui.label(RichText::new(format!("balance {}", balance)).size(26.0));
        if view.is_owner {
            ui.label(RichText::new("you own this vault").color(MUTED));
        }
        ui.separator();

        if self.variant.has_amount_fields() {
            self.amount_row(ui, InputField::DepositAmount, ActionKind::Deposit, "deposit");
            self.amount_row(ui, InputField::WithdrawAmount, ActionKind::Withdraw, "withdraw");
        } else {
            ui.horizontal(|ui| {
                if ui.button("deposit 1").clicked() {
                    self.trigger(ActionKind::Deposit);
                }
                if ui.button("withdraw 1").clicked() {
                    self.trigger(ActionKind::Withdraw);
                }
            });
        }
        self.amount_row(ui, InputField::LockAmount, ActionKind::LockTokens, "lock");
        self.amount_row(ui, InputField::UnlockAmount, ActionKind::UnlockTokens, "unlock");
        ui.separator();

        ui.horizontal(|ui| {
            ui.label("new owner");
            ui.text_edit_singleline(&mut self.form.new_owner);
            if ui.button("transfer ownership").clicked() {
                self.trigger(ActionKind::TransferOwnership);
            }
        });
        if view.owner_error {
            ui.label(RichText::new("ownership transfer failed").color(ERROR_COLOR));
        }
        ui.separator();

        ui.horizontal(|ui| {
            ui.label("file");
            ui.add(egui::TextEdit::singleline(&mut self.form.file_name).hint_text("name"));
            ui.add(
                egui::TextEdit::singleline(&mut self.form.file_size)
                    .hint_text("size")
                    .desired_width(80.0),
            );
            if ui.button("add").clicked() {
                self.trigger(ActionKind::AddFile);
            }
        });

        let mut remove = None;
        egui::ScrollArea::vertical().max_height(240.0).show(ui, |ui| {
            egui::Grid::new("files").num_columns(3).striped(true).show(ui, |ui| {
                for (index, file) in view.files.iter().enumerate() {
                    ui.label(&file.name);
                    ui.label(RichText::new(format!("{} bytes", file.size)).color(MUTED));
                    if ui.small_button("remove").clicked() {
                        remove = Some(index as u64);
                    }
                    ui.end_row();
                }
            });
        });
        if let Some(index) = remove {
            self.submit(Action::RemoveFile(index));
        }

        if let Some(error) = &self.input_error {
            ui.add_space(8.0);
            ui.label(RichText::new(error).color(ERROR_COLOR));
        }
    }

    fn amount_row(&mut self, ui: &mut egui::Ui, field: InputField, kind: ActionKind, label: &str) {
        ui.horizontal(|ui| {
            if let Some(text) = self.form.field_mut(field) {
                ui.add(egui::TextEdit::singleline(text).hint_text("amount").desired_width(160.0));
            }
            if ui.button(label).clicked() {
                self.trigger(kind);
            }
        });
    }

    fn render_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.pending_notices.front() else {
            return;
        };
        let text = notice.to_string();

        let mut dismissed = false;
        egui::Window::new("notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(text);
                ui.add_space(8.0);
                if ui.button("ok").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.pending_notices.pop_front();
        }
    }
}

impl<P: WalletProvider, C: ContractConnector> eframe::App for Dashboard<P, C> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_state();

        // background tasks change state without input events
        ctx.request_repaint_after(Duration::from_millis(250));

        let snapshot = self.snapshot.clone();
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(snapshot) = snapshot else {
                ui.spinner();
                return;
            };
            match snapshot.phase {
                SessionPhase::NoProvider => self.render_install(ui),
                SessionPhase::ProviderDetected => self.render_connect(ui),
                SessionPhase::AccountKnown => self.render_binding(ui, &snapshot),
                SessionPhase::ContractBound => self.render_dashboard(ui, &snapshot),
            }
        });

        self.render_notice(ctx);
    }
}

impl<P: WalletProvider, C: ContractConnector> Drop for Dashboard<P, C> {
    fn drop(&mut self) {
        // dropping the subscription inside the task unsubscribes
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("account listener stopped");
        }
    }
}
