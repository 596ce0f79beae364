use crate::config::ChainConfig;
use crate::types::{DexError, Result};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Provider stack used for state-changing calls
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Connector variants, selected once at session start. Capabilities are a
/// property of the kind, never re-probed ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    /// Local private key; can sign and can re-target the signing chain
    PrivateKey,

    /// View-only session; reads work, any signer use is rejected
    ReadOnly,
}

impl ConnectorKind {
    pub fn can_sign(&self) -> bool {
        matches!(self, ConnectorKind::PrivateKey)
    }

    pub fn can_switch_chain(&self) -> bool {
        matches!(self, ConnectorKind::PrivateKey)
    }
}

/// Holds the connected account and the chain the wallet reports.
/// Every write path goes through `ensure_chain` before dispatch.
pub struct WalletSession {
    chain: ChainConfig,
    provider: Arc<Provider<Http>>,
    connector: ConnectorKind,
    signer: Option<Arc<SignerClient>>,
    account: Option<Address>,
    reported_chain_id: AtomicU64,
}

impl WalletSession {
    /// Open a signing session from a raw private key
    pub fn connect_private_key(chain: ChainConfig, private_key: &str) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(chain.rpc_url.clone()).map_err(
            |e| DexError::RpcError(format!("Failed to create provider: {}", e)),
        )?);

        let wallet = LocalWallet::from_str(private_key)
            .map_err(|e| DexError::ConfigError(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain.chain_id);
        let account = wallet.address();
        let signer = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));

        info!(account = %format!("{:#x}", account), chain = chain.chain_id, "wallet connected");

        Ok(Self {
            reported_chain_id: AtomicU64::new(chain.chain_id),
            chain,
            provider,
            connector: ConnectorKind::PrivateKey,
            signer: Some(signer),
            account: Some(account),
        })
    }

    /// Open a view-only session with no signer
    pub fn connect_read_only(chain: ChainConfig) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(chain.rpc_url.clone()).map_err(
            |e| DexError::RpcError(format!("Failed to create provider: {}", e)),
        )?);

        Ok(Self {
            reported_chain_id: AtomicU64::new(chain.chain_id),
            chain,
            provider,
            connector: ConnectorKind::ReadOnly,
            signer: None,
            account: None,
        })
    }

    /// Drop the signer and account; the session becomes view-only
    pub fn disconnect(&mut self) {
        self.signer = None;
        self.account = None;
        self.connector = ConnectorKind::ReadOnly;
        info!("wallet disconnected");
    }

    pub fn connector(&self) -> ConnectorKind {
        self.connector
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    /// Signer stack, or WalletNotConnected for view-only sessions
    pub fn signer(&self) -> Result<Arc<SignerClient>> {
        self.signer.clone().ok_or(DexError::WalletNotConnected)
    }

    /// Connected account, or WalletNotConnected
    pub fn account(&self) -> Result<Address> {
        self.account.ok_or(DexError::WalletNotConnected)
    }

    /// Chain id the wallet currently reports
    pub fn reported_chain_id(&self) -> u64 {
        self.reported_chain_id.load(Ordering::SeqCst)
    }

    /// Record the chain id reported by the wallet/provider
    pub fn observe_chain(&self, chain_id: u64) {
        self.reported_chain_id.store(chain_id, Ordering::SeqCst);
    }

    /// Ask the RPC node which chain it serves and record it
    pub async fn refresh_chain_id(&self) -> Result<u64> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| DexError::RpcError(format!("Failed to read chain id: {}", e)))?
            .as_u64();
        self.observe_chain(id);
        Ok(id)
    }

    /// Reject any dispatch while the wallet is on the wrong network.
    /// Checked before a signature prompt is ever issued.
    pub fn ensure_chain(&self) -> Result<()> {
        let actual = self.reported_chain_id();
        if !self.chain.is_supported(actual) {
            return Err(DexError::NetworkMismatch {
                actual,
                expected: self.chain.chain_id,
            });
        }
        Ok(())
    }

    /// Remediation for NetworkMismatch: re-target the connector to the
    /// supported chain. Rejected for connectors that cannot switch.
    pub fn switch_chain(&mut self, chain_id: u64) -> Result<()> {
        if !self.connector.can_switch_chain() {
            return Err(DexError::WalletNotConnected);
        }
        if !self.chain.is_supported(chain_id) {
            return Err(DexError::NetworkMismatch {
                actual: chain_id,
                expected: self.chain.chain_id,
            });
        }
        if let Some(signer) = &self.signer {
            let wallet = signer.signer().clone().with_chain_id(chain_id);
            self.signer = Some(Arc::new(SignerMiddleware::new(
                (*self.provider).clone(),
                wallet,
            )));
        }
        self.observe_chain(chain_id);
        info!(chain = chain_id, "switched chain");
        Ok(())
    }
}
