//! derived view state, user actions and their input fields

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::session::{SessionPhase, WalletSession};
use crate::types::{Address, Amount, FileRecord};

/// state recomputed from read calls against the bound contract
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DerivedViewState {
    pub balance: Option<Amount>,
    pub is_owner: bool,
    pub files: Vec<FileRecord>,
    /// ownership transfer failed; cleared by timer only
    pub owner_error: bool,
}

/// everything a surface needs to render one frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub session: WalletSession,
    pub phase: SessionPhase,
    pub view: DerivedViewState,
    /// writes between submission and refresh
    pub pending_writes: usize,
    pub contract: Option<Address>,
}

/// user input fields of the dashboard
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum InputField {
    NewOwner,
    DepositAmount,
    WithdrawAmount,
    LockAmount,
    UnlockAmount,
    FileName,
    FileSize,
    /// row picked in the file list
    FileIndex,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputField::NewOwner => "new owner address",
            InputField::DepositAmount => "deposit amount",
            InputField::WithdrawAmount => "withdraw amount",
            InputField::LockAmount => "lock amount",
            InputField::UnlockAmount => "unlock amount",
            InputField::FileName => "file name",
            InputField::FileSize => "file size",
            InputField::FileIndex => "file selection",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    Deposit,
    Withdraw,
    TransferOwnership,
    LockTokens,
    UnlockTokens,
    AddFile,
    RemoveFile,
}

impl ActionKind {
    /// fields owned by this action, cleared after confirmation
    pub fn input_fields(&self) -> &'static [InputField] {
        match self {
            ActionKind::Deposit => &[InputField::DepositAmount],
            ActionKind::Withdraw => &[InputField::WithdrawAmount],
            ActionKind::TransferOwnership => &[InputField::NewOwner],
            ActionKind::LockTokens => &[InputField::LockAmount],
            ActionKind::UnlockTokens => &[InputField::UnlockAmount],
            ActionKind::AddFile => &[InputField::FileName, InputField::FileSize],
            ActionKind::RemoveFile => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Deposit => "deposit",
            ActionKind::Withdraw => "withdraw",
            ActionKind::TransferOwnership => "transfer ownership",
            ActionKind::LockTokens => "lock tokens",
            ActionKind::UnlockTokens => "unlock tokens",
            ActionKind::AddFile => "add file",
            ActionKind::RemoveFile => "remove file",
        }
    }
}

/// a validated write call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Deposit(Amount),
    Withdraw(Amount),
    /// new owner as entered; parsed at submission
    TransferOwnership(String),
    LockTokens(Amount),
    UnlockTokens(Amount),
    AddFile { name: String, size: u64 },
    RemoveFile(u64),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Deposit(_) => ActionKind::Deposit,
            Action::Withdraw(_) => ActionKind::Withdraw,
            Action::TransferOwnership(_) => ActionKind::TransferOwnership,
            Action::LockTokens(_) => ActionKind::LockTokens,
            Action::UnlockTokens(_) => ActionKind::UnlockTokens,
            Action::AddFile { .. } => ActionKind::AddFile,
            Action::RemoveFile(_) => ActionKind::RemoveFile,
        }
    }

    /// argument presence check done before anything is submitted
    pub fn validate(&self) -> Result<()> {
        match self {
            Action::AddFile { name, .. } if name.trim().is_empty() => {
                Err(SessionError::MissingInput(InputField::FileName))
            }
            Action::TransferOwnership(owner) if owner.trim().is_empty() => {
                Err(SessionError::MissingInput(InputField::NewOwner))
            }
            _ => Ok(()),
        }
    }

    pub fn completion_message(&self) -> String {
        match self {
            Action::Deposit(_) => "Deposit successful!".into(),
            Action::Withdraw(_) => "Withdrawal successful!".into(),
            Action::TransferOwnership(owner) => format!("Ownership transferred to {}", owner),
            Action::LockTokens(_) => "Tokens locked".into(),
            Action::UnlockTokens(_) => "Tokens unlocked".into(),
            Action::AddFile { name, .. } => format!("File {} added successfully!", name),
            Action::RemoveFile(_) => "File removed successfully!".into(),
        }
    }
}

/// messages for the user, drained by the surface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// no wallet provider at startup
    InstallWallet,
    /// connect pressed without a provider
    WalletRequired,
    /// account access denied or failed
    ConnectRejected(String),
    /// a write call was confirmed
    Completed { action: ActionKind, detail: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::InstallWallet => f.write_str("Please install a wallet provider in order to use this dashboard."),
            Notice::WalletRequired => f.write_str("A wallet provider is required to connect"),
            Notice::ConnectRejected(reason) => write!(f, "Could not connect wallet: {}", reason),
            Notice::Completed { detail, .. } => f.write_str(detail),
        }
    }
}

/// dashboard layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// amount fields for deposit and withdraw
    #[default]
    Full,
    /// deposit and withdraw always move exactly one unit
    FixedUnit,
}

impl Variant {
    pub fn has_amount_fields(&self) -> bool {
        matches!(self, Variant::Full)
    }
}

/// text of every input field on the dashboard
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormInputs {
    pub new_owner: String,
    pub deposit_amount: String,
    pub withdraw_amount: String,
    pub lock_amount: String,
    pub unlock_amount: String,
    pub file_name: String,
    pub file_size: String,
}

impl FormInputs {
    pub fn field(&self, field: InputField) -> &str {
        match field {
            InputField::NewOwner => &self.new_owner,
            InputField::DepositAmount => &self.deposit_amount,
            InputField::WithdrawAmount => &self.withdraw_amount,
            InputField::LockAmount => &self.lock_amount,
            InputField::UnlockAmount => &self.unlock_amount,
            InputField::FileName => &self.file_name,
            InputField::FileSize => &self.file_size,
            InputField::FileIndex => "",
        }
    }

    /// `None` for fields not backed by text
    pub fn field_mut(&mut self, field: InputField) -> Option<&mut String> {
        match field {
            InputField::NewOwner => Some(&mut self.new_owner),
            InputField::DepositAmount => Some(&mut self.deposit_amount),
            InputField::WithdrawAmount => Some(&mut self.withdraw_amount),
            InputField::LockAmount => Some(&mut self.lock_amount),
            InputField::UnlockAmount => Some(&mut self.unlock_amount),
            InputField::FileName => Some(&mut self.file_name),
            InputField::FileSize => Some(&mut self.file_size),
            InputField::FileIndex => None,
        }
    }

    pub fn clear_for(&mut self, kind: ActionKind) {
        for field in kind.input_fields() {
            if let Some(text) = self.field_mut(*field) {
                text.clear();
            }
        }
    }

    /// build the action from the current field text
    pub fn action(&self, kind: ActionKind) -> Result<Action> {
        match kind {
            ActionKind::Deposit => self.amount(InputField::DepositAmount).map(Action::Deposit),
            ActionKind::Withdraw => self.amount(InputField::WithdrawAmount).map(Action::Withdraw),
            ActionKind::LockTokens => self.amount(InputField::LockAmount).map(Action::LockTokens),
            ActionKind::UnlockTokens => self.amount(InputField::UnlockAmount).map(Action::UnlockTokens),
            ActionKind::TransferOwnership => self
                .required(InputField::NewOwner)
                .map(|owner| Action::TransferOwnership(owner.to_string())),
            ActionKind::AddFile => {
                let name = self.required(InputField::FileName)?;
                let size = self.required(InputField::FileSize)?;
                let size = size.parse::<u64>().map_err(|e| SessionError::InvalidInput {
                    field: InputField::FileSize,
                    reason: e.to_string(),
                })?;
                Ok(Action::AddFile {
                    name: name.to_string(),
                    size,
                })
            }
            ActionKind::RemoveFile => Err(SessionError::MissingInput(InputField::FileIndex)),
        }
    }

    /// like [`FormInputs::action`], honoring the dashboard variant
    pub fn action_for(&self, variant: Variant, kind: ActionKind) -> Result<Action> {
        match (variant, kind) {
            (Variant::FixedUnit, ActionKind::Deposit) => Ok(Action::Deposit(Amount::from_units(1))),
            (Variant::FixedUnit, ActionKind::Withdraw) => Ok(Action::Withdraw(Amount::from_units(1))),
            _ => self.action(kind),
        }
    }

    fn required(&self, field: InputField) -> Result<&str> {
        let text = self.field(field).trim();
        if text.is_empty() {
            Err(SessionError::MissingInput(field))
        } else {
            Ok(text)
        }
    }

    fn amount(&self, field: InputField) -> Result<Amount> {
        let text = self.required(field)?;
        Amount::parse_units(text).map_err(|e| SessionError::InvalidInput {
            field,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_inputs() {
        let form = FormInputs::default();
        for (kind, field) in [
            (ActionKind::Deposit, InputField::DepositAmount),
            (ActionKind::Withdraw, InputField::WithdrawAmount),
            (ActionKind::LockTokens, InputField::LockAmount),
            (ActionKind::UnlockTokens, InputField::UnlockAmount),
            (ActionKind::TransferOwnership, InputField::NewOwner),
            (ActionKind::AddFile, InputField::FileName),
            (ActionKind::RemoveFile, InputField::FileIndex),
        ] {
            match form.action(kind) {
                Err(SessionError::MissingInput(missing)) => assert_eq!(missing, field),
                other => panic!("{:?}: expected missing {:?}, got {:?}", kind, field, other),
            }
        }
    }

    #[test]
    fn test_form_actions() {
        let form = FormInputs {
            deposit_amount: "1.5".into(),
            new_owner: " 0x70997970c51812dc3a010c7d01b50e0d17dc79c8 ".into(),
            file_name: "report.txt".into(),
            file_size: "2048".into(),
            ..Default::default()
        };

        assert_eq!(
            form.action(ActionKind::Deposit).unwrap(),
            Action::Deposit(Amount::parse_units("1.5").unwrap())
        );
        assert_eq!(
            form.action(ActionKind::TransferOwnership).unwrap(),
            Action::TransferOwnership("0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into())
        );
        assert_eq!(
            form.action(ActionKind::AddFile).unwrap(),
            Action::AddFile {
                name: "report.txt".into(),
                size: 2048
            }
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let form = FormInputs {
            withdraw_amount: "abc".into(),
            new_owner: "0x1234".into(),
            file_name: "a".into(),
            file_size: "-4".into(),
            ..Default::default()
        };

        assert!(matches!(
            form.action(ActionKind::Withdraw),
            Err(SessionError::InvalidInput { field: InputField::WithdrawAmount, .. })
        ));
        // owner text is only checked for presence here
        assert_eq!(
            form.action(ActionKind::TransferOwnership).unwrap(),
            Action::TransferOwnership("0x1234".into())
        );
        assert!(matches!(
            form.action(ActionKind::AddFile),
            Err(SessionError::InvalidInput { field: InputField::FileSize, .. })
        ));
    }

    #[test]
    fn test_clear_for_only_touches_own_fields() {
        let mut form = FormInputs {
            deposit_amount: "1".into(),
            withdraw_amount: "2".into(),
            file_name: "x".into(),
            file_size: "3".into(),
            ..Default::default()
        };

        form.clear_for(ActionKind::AddFile);
        assert!(form.file_name.is_empty());
        assert!(form.file_size.is_empty());
        assert_eq!(form.deposit_amount, "1");

        form.clear_for(ActionKind::Deposit);
        assert!(form.deposit_amount.is_empty());
        assert_eq!(form.withdraw_amount, "2");
    }

    #[test]
    fn test_fixed_unit_ignores_amount_fields() {
        let form = FormInputs::default();
        assert_eq!(
            form.action_for(Variant::FixedUnit, ActionKind::Deposit).unwrap(),
            Action::Deposit(Amount::from_units(1))
        );
        assert_eq!(
            form.action_for(Variant::FixedUnit, ActionKind::Withdraw).unwrap(),
            Action::Withdraw(Amount::from_units(1))
        );
        assert!(form.action_for(Variant::FixedUnit, ActionKind::LockTokens).is_err());
        assert!(form.action_for(Variant::Full, ActionKind::Deposit).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Action::AddFile { name: "  ".into(), size: 1 }.validate().is_err());
        assert!(Action::TransferOwnership(" ".into()).validate().is_err());
        assert!(Action::TransferOwnership(Address::ZERO.to_string()).validate().is_ok());
        assert!(Action::Deposit(Amount::ZERO).validate().is_ok());
    }
}
