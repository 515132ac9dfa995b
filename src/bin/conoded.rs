//! `conoded`: the server binary. Grounded on the teacher's `main.rs` --
//! parse args, create the home directory, load or generate a persisted
//! identity, wire one channel per collaborator, then run until
//! interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use onet::config::Args;
use onet::kvstore::MemoryKvStore;
use onet::logging::{channel as log_channel, log, print_loop};
use onet::overlay::{Overlay, RegistryOnlyFactory};
use onet::registry::ProtocolRegistry;
use onet::server::Server;
use onet::service::ServiceManager;
use onet::suite::{CipherSuite, Ed25519Suite, SecretKey};
use onet::topology::{Address, Scheme, ServerIdentity};
use onet::transport::{InboundReceiver, TcpRouter};
use onet::PublicKey;

const KEYFILE: &str = ".keys";

/// Loads the keypair saved by a previous run, or generates and persists a
/// fresh one, matching the teacher's `fs::read(format!("{}/.keys", home))`
/// disk-keyfile pattern. Unlike `CipherSuite::key_pair()` (which always
/// mints a fresh random pair), this keeps the same identity across
/// restarts by round-tripping both halves through the suite's
/// `pack_public_key`/`pack_secret_key` so the on-disk format never assumes
/// a specific suite's internal key representation.
///
/// Keyfile layout: a 4-byte little-endian length prefix followed by the
/// packed public key, then the packed secret key filling the rest.
async fn load_or_generate_identity(home: &std::path::Path, suite: &dyn CipherSuite) -> Result<(PublicKey, SecretKey)> {
    let path = home.join(KEYFILE);
    if let Ok(bytes) = tokio::fs::read(&path).await {
        if bytes.len() < 4 {
            anyhow::bail!("stored keyfile {} is truncated", path.display());
        }
        let pk_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let rest = &bytes[4..];
        if rest.len() < pk_len {
            anyhow::bail!("stored keyfile {} is truncated", path.display());
        }
        let public_key = suite.unpack_public_key(&rest[..pk_len]);
        let secret_key = suite.unpack_secret_key(&rest[pk_len..]);
        return Ok((public_key, secret_key));
    }

    let (public_key, secret) = suite.key_pair();
    let packed_pk = suite.pack_public_key(&public_key);
    let packed_sk = suite.pack_secret_key(&secret);
    let mut bytes = Vec::with_capacity(4 + packed_pk.len() + packed_sk.len());
    bytes.extend_from_slice(&(packed_pk.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&packed_pk);
    bytes.extend_from_slice(&packed_sk);
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok((public_key, secret))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();
    args.ensure_home().await.context("creating home directory")?;
    args.apply_db_path_override();

    let (print_tx, print_rx) = log_channel();
    let verbosity = if args.debug { 2 } else { 1 };
    tokio::spawn(print_loop(print_rx, verbosity));

    let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
    let (public_key, secret_key) = load_or_generate_identity(&args.home, suite.as_ref()).await?;

    let socket_addr: std::net::SocketAddr = args.address.parse().context("parsing --address")?;
    let our = ServerIdentity::new(
        public_key.clone(),
        Address::new(Scheme::Tcp, socket_addr.ip().to_string(), socket_addr.port()),
    );

    let listener = TcpListener::bind(socket_addr).await.context("binding transport address")?;
    let (inbound_tx, inbound_rx): (_, InboundReceiver) = tokio::sync::mpsc::channel(1024);
    let router = Arc::new(TcpRouter::new());
    tokio::spawn(TcpRouter::serve(listener, inbound_tx));

    let overlay = Overlay::new(
        our.clone(),
        suite.clone(),
        secret_key,
        router,
        ProtocolRegistry::default(),
        Arc::new(RegistryOnlyFactory),
        print_tx.clone(),
    );

    #[cfg(feature = "rocksdb")]
    let db: Arc<dyn onet::kvstore::KvStore> = {
        let path = onet::service::resolve_db_path(&public_key, suite.as_ref())?;
        onet::kvstore::RocksKvStore::open(&path)?
    };
    #[cfg(not(feature = "rocksdb"))]
    let db: Arc<dyn onet::kvstore::KvStore> = MemoryKvStore::new();

    let services = ServiceManager::new(our, db, print_tx.clone());
    let server = Server::new(overlay, services.clone(), print_tx.clone());
    server.start(inbound_rx);
    server.wait_startup().await;
    log(&print_tx, 1, format!("conoded: listening on {socket_addr}"));

    let ws_addr: std::net::SocketAddr = args.ws_address.parse().context("parsing --ws-address")?;
    let frontend = Arc::new(onet::ws::ClientFrontend::new(ws_addr));
    let frontend_task = tokio::spawn({
        let frontend = frontend.clone();
        let services = services.clone();
        let print_tx = print_tx.clone();
        async move { frontend.run(services, print_tx).await }
    });

    tokio::signal::ctrl_c().await.ok();
    log(&print_tx, 1, "conoded: shutting down".to_string());
    frontend_task.abort();
    server.close().await;
    Ok(())
}
