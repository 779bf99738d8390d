//! # Surface Client
//!
//! Subscribes to the reconstructed surfaces published by the sensor pipeline.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::scene::SurfaceMsg,
    net::{zmq, JsonMsgError, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SurfaceClient {
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SurfaceClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not recieve a surface: {0}")]
    RecvError(JsonMsgError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SurfaceClient {
    /// Create a new instance of the surface client.
    ///
    /// This function will not block until the publisher connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, SurfaceClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 100,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, &params.surface_endpoint)
            .map_err(SurfaceClientError::SocketError)?;

        Ok(Self { socket })
    }

    pub fn is_connected(&self) -> bool {
        self.socket.connected()
    }

    /// Recieve the next surface.
    ///
    /// Returns `Ok(None)` if no surface arrived within the receive timeout.
    pub fn recv_surface(&self) -> Result<Option<SurfaceMsg>, SurfaceClientError> {
        self.socket
            .recv_json()
            .map_err(SurfaceClientError::RecvError)
    }
}
