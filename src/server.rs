use std::sync::Arc;

use futures_util::future::join_all;
use tokio::{net::TcpListener, sync::broadcast};

use crate::{
    handler::TransactionHandler,
    internal,
    session::{Session, SessionConfig},
};

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}

/// Accepts connections and runs one [`Session`] per connection.
pub struct Server {
    config: Arc<SessionConfig>,
    handler: Arc<dyn TransactionHandler>,
}

impl Server {
    pub fn new(config: SessionConfig, handler: Arc<dyn TransactionHandler>) -> Self {
        Self {
            config: Arc::new(config),
            handler,
        }
    }

    /// Serve `listener` until a [`Signal::Shutdown`] arrives, then stop
    /// accepting and wait for the open sessions to finish.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        internal!(level = INFO, "Serving SMTP on {local}");

        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(level = INFO, "Listener {local} received shutdown signal, finishing sessions ...");
                        join_all(sessions).await;
                        return Ok(());
                    }
                }

                connection = listener.accept() => {
                    let (stream, peer) = connection?;
                    tracing::debug!("Connection received on {local} from {peer}");

                    let session = Session::create(
                        stream,
                        peer,
                        Arc::clone(&self.config),
                        Arc::clone(&self.handler),
                    );

                    sessions.retain(|handle: &tokio::task::JoinHandle<()>| !handle.is_finished());
                    // Errors are reported through the handler by `Session::run`
                    sessions.push(tokio::spawn(async move {
                        let _ = session.run().await;
                    }));
                }
            }
        }
    }
}
