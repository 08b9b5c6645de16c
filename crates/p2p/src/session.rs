use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use wire::{
    encode_message, MerkleBlockMessage, Message, RawTx, RejectCode, RejectMessage, VersionMessage,
    WireError, MIN_PROTOCOL_VERSION,
};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{ManagerRequest, RemoteHost};
use crate::framing::Framer;
use crate::merkle::DecodedMerkleBlock;

/// State for one peer connection.
///
/// Owned exclusively by its inbound task; the outbound writer observes only
/// its channel end and the write half of the socket, so no locking is needed
/// anywhere in a session.
pub struct PeerSession {
    remote: RemoteHost,
    config: SessionConfig,
    outbound: mpsc::Sender<Message>,
    manager: mpsc::Sender<ManagerRequest>,
    /// `Some` once the peer's `version` was accepted; never cleared.
    peer_version: Option<VersionMessage>,
    /// `Some` only between a `merkleblock` and the flush that reports it.
    inflight_merkle: Option<DecodedMerkleBlock>,
}

impl PeerSession {
    /// The embedder supplies the channel ends: it keeps the writer side of
    /// `outbound` (everything it sends goes straight to the wire) and the
    /// reader side of the manager channel.
    pub fn new(
        remote: RemoteHost,
        config: SessionConfig,
        outbound: mpsc::Sender<Message>,
        manager: mpsc::Sender<ManagerRequest>,
    ) -> Self {
        Self {
            remote,
            config,
            outbound,
            manager,
            peer_version: None,
            inflight_merkle: None,
        }
    }

    /// Drives the connection until the peer disconnects, a channel closes, or
    /// a protocol/framing error forces a disconnect.
    ///
    /// Spawns the writer task for the outbound channel, then reads, frames
    /// and dispatches inbound messages.  On any exit path the writer drains
    /// what the session already queued (a final `reject` in particular) and
    /// shuts the socket down.
    pub async fn run<S>(
        mut self,
        stream: S,
        outbound_rx: mpsc::Receiver<Message>,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let writer_task = tokio::spawn(write_loop(
            writer,
            outbound_rx,
            self.config,
            self.remote.clone(),
            shutdown_rx,
        ));

        let result = self.read_loop(reader).await;

        drop(shutdown_tx);
        let _ = writer_task.await;

        match result {
            Ok(()) => Ok(()),
            Err(SessionError::ChannelClosed) => {
                debug!(remote = %self.remote, "channel closed, session ending");
                Ok(())
            }
            Err(err) => {
                warn!(remote = %self.remote, error = %err, "session failed");
                Err(err)
            }
        }
    }

    async fn read_loop<R>(&mut self, mut reader: R) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut framer = Framer::new(self.config.network, self.config.max_payload_bytes);
        let mut chunk = vec![0u8; self.config.read_chunk_bytes];
        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                if framer.in_progress() {
                    return Err(WireError::Truncated("message frame").into());
                }
                debug!(remote = %self.remote, "peer closed the connection");
                return Ok(());
            }
            framer.feed(&chunk[..read]);
            while let Some(decoded) = framer.next() {
                self.dispatch(decoded?).await?;
            }
        }
    }

    async fn dispatch(&mut self, message: Message) -> Result<(), SessionError> {
        // any non-tx message ends an in-flight merkle bundle: whatever
        // transactions were going to follow the merkleblock have followed it
        if self.inflight_merkle.is_some() && !matches!(message, Message::Tx(_)) {
            self.flush_merkle().await?;
        }

        match message {
            Message::Version(version) => self.on_version(version).await,
            Message::VerAck => {
                debug!(remote = %self.remote, "verack received");
                Ok(())
            }
            other if self.peer_version.is_none() => {
                Err(SessionError::HandshakeRequired(other.command().to_string()))
            }
            Message::Ping(nonce) => self.send(Message::Pong(nonce)).await,
            Message::MerkleBlock(block) => self.on_merkle_block(block).await,
            Message::Tx(tx) => self.on_tx(tx).await,
            other => {
                self.emit(ManagerRequest::PassThrough(self.remote.clone(), other))
                    .await
            }
        }
    }

    async fn on_version(&mut self, version: VersionMessage) -> Result<(), SessionError> {
        if self.peer_version.is_some() {
            let reject = RejectMessage::new(
                "version",
                RejectCode::Duplicate,
                "Duplicate version message",
            );
            self.send(Message::Reject(reject)).await?;
            return Err(SessionError::DuplicateVersion);
        }
        if version.version < MIN_PROTOCOL_VERSION {
            return Err(SessionError::VersionTooOld(version.version));
        }

        debug!(
            remote = %self.remote,
            version = version.version,
            agent = %version.user_agent,
            height = version.start_height,
            "handshake complete"
        );
        self.peer_version = Some(version.clone());
        self.send(Message::VerAck).await?;
        self.emit(ManagerRequest::Handshake(self.remote.clone(), version))
            .await
    }

    async fn on_merkle_block(&mut self, block: MerkleBlockMessage) -> Result<(), SessionError> {
        let decoded = DecodedMerkleBlock::from_message(block)?;
        debug!(
            remote = %self.remote,
            root = %hex::encode(decoded.merkle_root),
            matched = decoded.expected_txs.len(),
            "merkle block received"
        );
        if decoded.expected_txs.is_empty() {
            // nothing will follow it, report right away
            self.emit(ManagerRequest::MerkleBlockReady(
                self.remote.clone(),
                decoded,
            ))
            .await
        } else {
            self.inflight_merkle = Some(decoded);
            Ok(())
        }
    }

    async fn on_tx(&mut self, tx: RawTx) -> Result<(), SessionError> {
        if let Some(inflight) = self.inflight_merkle.as_mut() {
            let txid = tx.txid();
            if inflight.expects(&txid) {
                debug!(remote = %self.remote, txid = %hex::encode(txid), "merkle transaction collected");
                inflight.txs.push(tx);
                return Ok(());
            }
            // an unrelated tx ends the bundle just like any other message
            self.flush_merkle().await?;
        }
        self.emit(ManagerRequest::PassThrough(
            self.remote.clone(),
            Message::Tx(tx),
        ))
        .await
    }

    async fn flush_merkle(&mut self) -> Result<(), SessionError> {
        if let Some(mut inflight) = self.inflight_merkle.take() {
            inflight.finalize();
            debug!(
                remote = %self.remote,
                collected = inflight.txs.len(),
                expected = inflight.expected_txs.len(),
                "merkle block ready"
            );
            self.emit(ManagerRequest::MerkleBlockReady(
                self.remote.clone(),
                inflight,
            ))
            .await?;
        }
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    async fn emit(&self, request: ManagerRequest) -> Result<(), SessionError> {
        self.manager
            .send(request)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// Encodes and writes outbound messages until the channel closes, the socket
/// errors, or the session signals shutdown.  The shutdown path drains already
/// queued messages so a terminal `reject` still reaches the peer.
async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Message>,
    config: SessionConfig,
    remote: RemoteHost,
    mut shutdown: oneshot::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                outbound.close();
                while let Ok(message) = outbound.try_recv() {
                    if write_frame(&mut writer, &message, &config).await.is_err() {
                        break;
                    }
                }
                break;
            }
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(err) = write_frame(&mut writer, &message, &config).await {
                        warn!(remote = %remote, error = %err, "failed to write message");
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_frame<W>(
    writer: &mut W,
    message: &Message,
    config: &SessionConfig,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_message(message, config.network)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}
