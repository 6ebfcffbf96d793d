//! remote vault contract
//!
//! the contract itself is an external collaborator. the session only sees
//! three read calls and seven write calls; every write returns a pending
//! transaction whose confirmation must be awaited before reads reflect it.

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::abi::{functions, InterfaceDescriptor};
use crate::error::Result;
use crate::types::{Address, Amount, FileRecord, Receipt, TxHash};

/// submitted, not yet confirmed transaction
pub trait PendingTx: Send + 'static {
    fn tx_hash(&self) -> TxHash;

    /// wait for on-chain confirmation; no local timeout
    fn wait(self) -> impl Future<Output = Result<Receipt>> + Send;
}

/// call surface of the deployed vault
pub trait VaultContract: Send + Sync + 'static {
    type Pending: PendingTx;

    fn get_balance(&self) -> impl Future<Output = Result<Amount>> + Send;

    fn is_owner(&self, account: Address) -> impl Future<Output = Result<bool>> + Send;

    fn get_files(&self) -> impl Future<Output = Result<Vec<FileRecord>>> + Send;

    fn deposit(&self, amount: Amount) -> impl Future<Output = Result<Self::Pending>> + Send;

    fn withdraw(&self, amount: Amount) -> impl Future<Output = Result<Self::Pending>> + Send;

    fn transfer_ownership(
        &self,
        new_owner: Address,
    ) -> impl Future<Output = Result<Self::Pending>> + Send;

    fn lock_tokens(&self, amount: Amount) -> impl Future<Output = Result<Self::Pending>> + Send;

    fn unlock_tokens(&self, amount: Amount) -> impl Future<Output = Result<Self::Pending>> + Send;

    fn add_file(&self, name: String, size: u64) -> impl Future<Output = Result<Self::Pending>> + Send;

    fn remove_file(&self, index: u64) -> impl Future<Output = Result<Self::Pending>> + Send;
}

/// builds contract handles signed by a given account
pub trait ContractConnector: Send + Sync + 'static {
    type Contract: VaultContract;

    fn connect(
        &self,
        address: Address,
        interface: Arc<InterfaceDescriptor>,
        signer: Address,
    ) -> Result<Self::Contract>;
}

/// bound handle to the vault, tied to one signer account
pub struct ContractBinding<K> {
    address: Address,
    signer: Address,
    handle: Arc<K>,
}

impl<K: VaultContract> ContractBinding<K> {
    /// bind the contract for `signer`; a signer is required by construction
    pub fn bind<C>(
        connector: &C,
        address: Address,
        interface: Arc<InterfaceDescriptor>,
        signer: Address,
    ) -> Result<Self>
    where
        C: ContractConnector<Contract = K>,
    {
        interface.require(&functions::REQUIRED)?;
        let handle = connector.connect(address, interface, signer)?;
        info!("bound contract {} for signer {}", address, signer);

        Ok(Self {
            address,
            signer,
            handle: Arc::new(handle),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn handle(&self) -> Arc<K> {
        self.handle.clone()
    }
}

impl<K> Clone for ContractBinding<K> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            signer: self.signer,
            handle: self.handle.clone(),
        }
    }
}

impl<K> std::fmt::Debug for ContractBinding<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractBinding")
            .field("address", &self.address)
            .field("signer", &self.signer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;

    #[tokio::test]
    async fn test_bind_records_signer() {
        let owner = Address::from_bytes([1; 20]);
        let connector = MockConnector::new(owner, Amount::ZERO);
        let interface = Arc::new(InterfaceDescriptor::vault().unwrap());
        let contract = Address::from_bytes([0xcc; 20]);

        let binding = ContractBinding::bind(&connector, contract, interface, owner).unwrap();
        assert_eq!(binding.address(), contract);
        assert_eq!(binding.signer(), owner);
        assert_eq!(connector.bound_signers(), vec![owner]);

        let balance = binding.handle().get_balance().await.unwrap();
        assert_eq!(balance, Amount::ZERO);
    }

    #[test]
    fn test_bind_rejects_incomplete_interface() {
        let owner = Address::from_bytes([1; 20]);
        let connector = MockConnector::new(owner, Amount::ZERO);
        let partial = InterfaceDescriptor::parse(
            r#"[{"type":"function","name":"getBalance","inputs":[],"outputs":[],"stateMutability":"view"}]"#,
        )
        .unwrap();

        let result = ContractBinding::bind(&connector, Address::ZERO, Arc::new(partial), owner);
        assert!(result.is_err());
        assert!(connector.bound_signers().is_empty());
    }
}
