//! # Action Server
//!
//! Requester-facing network interface. Requests (submit, cancel, status) arrive on a REP socket
//! and are answered immediately, terminal goal events are broadcast on a PUB socket.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    goal::{ActionRequest, ActionResponse, GoalEvent, GoalParseError},
    net::{
        bind_endpoint, zmq, JsonMsgError, MonitoredSocket, MonitoredSocketError, NetParams,
        SocketOptions,
    },
};
use log::warn;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Action server
pub struct ActionServer {
    /// Request-response socket for goal requests
    reqrep: MonitoredSocket,

    /// Publisher socket for goal events
    events: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ActionServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not recieve a request: {0}")]
    RecvError(JsonMsgError),

    #[error("Could not send a message: {0}")]
    SendError(JsonMsgError),

    #[error("Could not parse the recieved request: {0}")]
    RequestParseError(GoalParseError),

    #[error("The recieved request is not valid UTF-8")]
    NonUtf8Request,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActionServerError {
    /// Returns true if the server can no longer serve requests.
    ///
    /// Malformed requests have already been answered `Invalid` and are not fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ActionServerError::RequestParseError(_) | ActionServerError::NonUtf8Request
        )
    }
}

impl ActionServer {
    /// Create a new instance of the action server.
    ///
    /// This function will not block until a requester connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, ActionServerError> {
        let reqrep_opts = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            send_timeout: 10,
            ..Default::default()
        };

        let events_opts = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            linger: 1,
            send_timeout: 10,
            ..Default::default()
        };

        let reqrep = MonitoredSocket::new(
            ctx,
            zmq::REP,
            reqrep_opts,
            &bind_endpoint(&params.action_endpoint),
        )
        .map_err(ActionServerError::SocketError)?;
        let events = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            events_opts,
            &bind_endpoint(&params.event_endpoint),
        )
        .map_err(ActionServerError::SocketError)?;

        Ok(Self { reqrep, events })
    }

    /// Recieve a single request.
    ///
    /// Call in a loop until `Ok(None)` is returned, indicating that there are no pending requests
    /// right now. A valid request must be answered with [`ActionServer::send_response`] before
    /// the next one can be recieved. An invalid request is answered automatically.
    pub fn recv_request(&self) -> Result<Option<ActionRequest>, ActionServerError> {
        let req_str = match self.reqrep.recv_json_str() {
            Ok(Some(s)) => s,
            Ok(None) => return Ok(None),
            Err(JsonMsgError::NonUtf8Message) => {
                self.send_response(ActionResponse::Invalid)?;
                return Err(ActionServerError::NonUtf8Request);
            }
            Err(e) => return Err(ActionServerError::RecvError(e)),
        };

        match ActionRequest::from_json(&req_str) {
            Ok(r) => Ok(Some(r)),
            Err(e) => {
                self.send_response(ActionResponse::Invalid)?;
                Err(ActionServerError::RequestParseError(e))
            }
        }
    }

    /// Send the response to the last recieved request.
    pub fn send_response(&self, response: ActionResponse) -> Result<(), ActionServerError> {
        self.reqrep
            .send_json(&response)
            .map_err(ActionServerError::SendError)
    }

    /// Broadcast a terminal goal event.
    pub fn publish_event(&self, event: &GoalEvent) -> Result<(), ActionServerError> {
        if let Err(e) = self.events.send_json(event) {
            warn!("Could not publish event for goal {}", event.goal_id);
            return Err(ActionServerError::SendError(e));
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::goal::GoalId;
    use std::time::{Duration, Instant};

    fn recv_next(server: &ActionServer) -> Result<ActionRequest, ActionServerError> {
        let start = Instant::now();
        loop {
            assert!(start.elapsed() < Duration::from_secs(5), "no request recieved");
            if let Some(r) = server.recv_request()? {
                return Ok(r);
            }
        }
    }

    #[test]
    fn test_requests() {
        let ctx = zmq::Context::new();
        let params = NetParams {
            action_endpoint: String::from("tcp://127.0.0.1:45741"),
            event_endpoint: String::from("tcp://127.0.0.1:45742"),
            planner_endpoint: String::new(),
            surface_endpoint: String::new(),
        };

        let server = ActionServer::new(&ctx, &params).unwrap();

        let client = ctx.socket(zmq::REQ).unwrap();
        client.set_rcvtimeo(5000).unwrap();
        client.connect(&params.action_endpoint).unwrap();

        // Malformed requests are answered without reaching the caller
        client.send("{\"Launch\": 1}", 0).unwrap();
        assert!(matches!(
            recv_next(&server),
            Err(ActionServerError::RequestParseError(_))
        ));
        let rep: ActionResponse =
            serde_json::from_str(&client.recv_string(0).unwrap().unwrap()).unwrap();
        assert_eq!(rep, ActionResponse::Invalid);

        // As are requests which are not text at all
        client.send(&[0xffu8, 0xfe][..], 0).unwrap();
        let err = recv_next(&server).unwrap_err();
        assert!(matches!(err, ActionServerError::NonUtf8Request));
        assert!(!err.is_fatal());
        let rep: ActionResponse =
            serde_json::from_str(&client.recv_string(0).unwrap().unwrap()).unwrap();
        assert_eq!(rep, ActionResponse::Invalid);

        client.send("{\"Cancel\": 4}", 0).unwrap();
        assert_eq!(
            recv_next(&server).unwrap(),
            ActionRequest::Cancel(GoalId(4))
        );
        server
            .send_response(ActionResponse::CancelAccepted)
            .unwrap();
        let rep: ActionResponse =
            serde_json::from_str(&client.recv_string(0).unwrap().unwrap()).unwrap();
        assert_eq!(rep, ActionResponse::CancelAccepted);
    }
}
