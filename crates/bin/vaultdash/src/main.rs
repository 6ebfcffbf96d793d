use anyhow::Result;
use clap::Parser;
use eframe::egui;
use tracing::info;
use vault_session::mock::{MockConnector, MockWallet};
use vault_session::{Address, Amount, RpcConnector, RpcProvider, SessionController};

mod app;
mod cli;

use app::Dashboard;
use cli::Cli;

/// hardhat's first two default accounts
const SIMULATED_ACCOUNTS: [&str; 2] = [
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
];

fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultdash=info,vault_session=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.session_config()?;
    let runtime = tokio::runtime::Runtime::new()?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 820.0])
            .with_title("vaultdash"),
        ..Default::default()
    };

    if cli.simulate {
        info!("starting vaultdash with simulated wallet");
        let accounts = SIMULATED_ACCOUNTS
            .iter()
            .map(|a| a.parse())
            .collect::<vault_session::Result<Vec<Address>>>()?;
        let wallet = MockWallet::with_accounts(accounts.clone());
        let connector = MockConnector::new(accounts[0], Amount::ZERO);
        let (controller, notices) = SessionController::new(Some(wallet), connector, config)?;
        run(Dashboard::new(runtime, controller, notices), options)
    } else {
        info!("starting vaultdash against {}", config.rpc_endpoint);
        let provider = runtime.block_on(RpcProvider::probe(&config));
        let connector = match &provider {
            Some(provider) => RpcConnector::from_provider(provider, &config),
            None => RpcConnector::new(&config),
        };
        let (controller, notices) = SessionController::new(provider, connector, config)?;
        run(Dashboard::new(runtime, controller, notices), options)
    }
}

fn run<A: eframe::App + 'static>(app: A, options: eframe::NativeOptions) -> Result<()> {
    eframe::run_native(
        "vaultdash",
        options,
        Box::new(|cc| {
            configure_style(&cc.egui_ctx);
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {}", e))?;

    Ok(())
}

fn configure_style(ctx: &egui::Context) {
    use egui::{Color32, Rounding, Stroke, Vec2};

    let mut style = (*ctx.style()).clone();

    let bg = Color32::from_rgb(28, 28, 30);
    let surface = Color32::from_rgb(38, 38, 40);
    let border = Color32::from_rgb(58, 58, 60);
    let accent = Color32::from_rgb(142, 142, 147);

    style.spacing.item_spacing = Vec2::new(10.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(24.0);
    style.spacing.button_padding = Vec2::new(16.0, 6.0);

    style.visuals.window_rounding = Rounding::ZERO;
    style.visuals.widgets.inactive.rounding = Rounding::ZERO;
    style.visuals.widgets.hovered.rounding = Rounding::ZERO;
    style.visuals.widgets.active.rounding = Rounding::ZERO;

    style.visuals.widgets.noninteractive.bg_stroke = Stroke::new(1.0, border);
    style.visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, border);

    style.visuals.window_fill = bg;
    style.visuals.panel_fill = bg;
    style.visuals.widgets.inactive.bg_fill = surface;
    style.visuals.widgets.hovered.bg_fill = accent;

    ctx.set_style(style);
}
