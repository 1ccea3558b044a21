// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept loop: for each accepted connection, allocate a fresh terminal
//! ID and spawn a terminal actor. Stoppable via the manager's shared
//! `CancellationToken`.

use crate::ids::TerminalIdAllocator;
use crate::router::Router;
use crate::terminal::{self, ConfigValues};
use mb_core::Msg;
use mb_queue::{Queue, QueueRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TerminalServer {
    listener: TcpListener,
    ids: TerminalIdAllocator,
    registry: Arc<QueueRegistry>,
    pub_queue: Arc<Queue<Msg>>,
    router: Option<Arc<dyn Router>>,
    local_id: String,
    config_values: ConfigValues,
    shutdown: CancellationToken,
}

impl TerminalServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listener: TcpListener,
        registry: Arc<QueueRegistry>,
        pub_queue: Arc<Queue<Msg>>,
        router: Option<Arc<dyn Router>>,
        local_id: String,
        config_values: ConfigValues,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listener,
            ids: TerminalIdAllocator::new(),
            registry,
            pub_queue,
            router,
            local_id,
            config_values,
            shutdown,
        }
    }

    /// Runs the accept loop until shutdown is signalled.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("terminal server shutting down");
                    return;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((conn, addr)) => {
                            let id = self.ids.next();
                            tracing::debug!(terminal = %id, peer = %addr, "terminal connected");
                            let registry = self.registry.clone();
                            let pub_queue = self.pub_queue.clone();
                            let router = self.router.clone();
                            let local_id = self.local_id.clone();
                            let config_values = self.config_values.clone();
                            let shutdown = self.shutdown.clone();
                            tokio::spawn(async move {
                                terminal::run(id, conn, registry, pub_queue, router, local_id, config_values, shutdown)
                                    .await;
                            });
                        }
                        Err(e) => tracing::error!(error = %e, "accept error"),
                    }
                }
            }
        }
    }
}
