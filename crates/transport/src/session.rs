use std::time::Duration;

use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, Ticket,
};
use arrow_schema::Schema;
use flightline_common::{Error, Result, Settings, TransportSecurity};
use futures::Stream;
use tokio::sync::Mutex;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status, Streaming};
use tracing::{debug, info, warn};

use crate::auth::{AuthCell, AuthState, AUTHORIZATION};
use crate::channel::{self, FlightClient};
use crate::ipc::ReassembledStream;

/// Deadline of a do-get call, measured from call start.
pub const DO_GET_DEADLINE: Duration = Duration::from_secs(60);

/// One authenticated Flight channel and the primitive calls made over it.
///
/// The channel is created on first use. All calls attach the current authorization
/// header, read by value so that concurrent calls never observe a partial update.
pub struct FlightSession {
    settings: Settings,
    auth: AuthCell,
    client: Mutex<Option<FlightClient>>,
    do_get_deadline: Duration,
}

impl FlightSession {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let auth = AuthCell::new(AuthState::from_credential(&settings.credential()));
        Ok(Self {
            settings,
            auth,
            client: Mutex::new(None),
            do_get_deadline: DO_GET_DEADLINE,
        })
    }

    /// Replaces the [`DO_GET_DEADLINE`] default.
    pub fn with_do_get_deadline(mut self, deadline: Duration) -> Self {
        self.do_get_deadline = deadline;
        self
    }

    pub fn transport_security(&self) -> TransportSecurity {
        self.settings.transport_security()
    }

    /// Current authorization header value.
    pub async fn authorization(&self) -> Option<String> {
        self.auth.snapshot().await.header
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Establishes the channel (and runs the handshake) if that has not happened yet.
    pub async fn connect(&self) -> Result<()> {
        self.client().await.map(|_| ())
    }

    /// Drops the channel. Closing an unconnected or already closed session is a no-op.
    pub async fn close(&self) {
        if self.client.lock().await.take().is_some() {
            debug!(uri = %self.settings.endpoint_uri(), "closed flight channel");
        }
    }

    async fn client(&self) -> Result<FlightClient> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = channel::connect(&self.settings).await?;
        if !self.settings.credential().is_none() {
            self.handshake(client.clone()).await?;
        }
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn request<T>(&self, message: T) -> Result<Request<T>> {
        let mut request = Request::new(message);
        self.auth.snapshot().await.apply(&mut request)?;
        Ok(request)
    }

    /// Sends one empty handshake request with the configured credential.
    ///
    /// An `authorization` header in the response headers or trailers replaces the
    /// session's header, at most once per session. A response without one leaves it
    /// unchanged.
    async fn handshake(&self, mut client: FlightClient) -> Result<()> {
        let observed = self.auth.snapshot().await;
        let mut request = Request::new(futures::stream::iter(vec![HandshakeRequest::default()]));
        observed.apply(&mut request)?;

        let response = client
            .handshake(request)
            .await
            .map_err(|status| handshake_failed(&status))?;
        let mut replacement = authorization_from(response.metadata());

        if replacement.is_none() {
            let mut stream = response.into_inner();
            while stream
                .message()
                .await
                .map_err(|status| handshake_failed(&status))?
                .is_some()
            {}
            let trailers = stream
                .trailers()
                .await
                .map_err(|status| handshake_failed(&status))?;
            replacement = trailers.as_ref().and_then(authorization_from);
        }

        match replacement {
            Some(header) => {
                if self.auth.compare_and_set(0, header).await {
                    info!("handshake replaced session authorization");
                } else {
                    debug!("session authorization already replaced, keeping current value");
                }
            }
            None => debug!("handshake completed without authorization header"),
        }
        Ok(())
    }

    pub async fn get_flight_info(&self, descriptor: FlightDescriptor) -> Result<FlightInfo> {
        let mut client = self.client().await?;
        let request = self.request(descriptor).await?;
        debug!("get_flight_info");
        let info = client.get_flight_info(request).await?.into_inner();
        Ok(info)
    }

    /// Streams the ticket's frames and reassembles them once the stream ends.
    pub async fn do_get(&self, ticket: Ticket) -> Result<ReassembledStream> {
        let mut client = self.client().await?;
        let mut request = self.request(ticket).await?;
        let deadline = self.do_get_deadline;
        request.set_timeout(deadline);
        debug!("do_get");

        let collect = async move {
            let stream = client.do_get(request).await?.into_inner();
            drain(stream).await
        };
        let frames = match tokio::time::timeout(deadline, collect).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!(
                "do_get exceeded {}ms deadline",
                deadline.as_millis()
            ))),
        }
        .map_err(|status| {
            warn!(code = ?status.code(), message = status.message(), "do_get stream failed");
            Error::from(status)
        })?;

        debug!(frames = frames.len(), "do_get stream complete");
        Ok(ReassembledStream::from_frames(&frames))
    }

    /// Sends `frames` in order, half-closes, and waits for the server to finish.
    pub async fn do_put<S>(&self, frames: S) -> Result<()>
    where
        S: Stream<Item = FlightData> + Send + 'static,
    {
        let mut client = self.client().await?;
        let request = self.request(frames).await?;
        debug!("do_put");
        let acks = drain(client.do_put(request).await?.into_inner()).await?;
        debug!(acks = acks.len(), "do_put acknowledged");
        Ok(())
    }

    pub async fn do_action(&self, action: Action) -> Result<Vec<arrow_flight::Result>> {
        let mut client = self.client().await?;
        debug!(action = %action.r#type, "do_action");
        let request = self.request(action).await?;
        Ok(drain(client.do_action(request).await?.into_inner()).await?)
    }

    pub async fn list_flights(&self, criteria: Criteria) -> Result<Vec<FlightInfo>> {
        let mut client = self.client().await?;
        let request = self.request(criteria).await?;
        debug!("list_flights");
        Ok(drain(client.list_flights(request).await?.into_inner()).await?)
    }

    pub async fn list_actions(&self) -> Result<Vec<ActionType>> {
        let mut client = self.client().await?;
        let request = self.request(Empty {}).await?;
        debug!("list_actions");
        Ok(drain(client.list_actions(request).await?.into_inner()).await?)
    }

    pub async fn get_schema(&self, descriptor: FlightDescriptor) -> Result<Schema> {
        let mut client = self.client().await?;
        let request = self.request(descriptor).await?;
        debug!("get_schema");
        let result = client.get_schema(request).await?.into_inner();
        Ok(Schema::try_from(&result)?)
    }
}

/// Buffers every message of `stream` in arrival order.
async fn drain<T>(mut stream: Streaming<T>) -> std::result::Result<Vec<T>, Status> {
    let mut items = Vec::new();
    while let Some(item) = stream.message().await? {
        items.push(item);
    }
    Ok(items)
}

fn authorization_from(metadata: &MetadataMap) -> Option<String> {
    metadata
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn handshake_failed(status: &Status) -> Error {
    warn!(code = ?status.code(), message = status.message(), "handshake failed");
    Error::Authentication(format!("handshake failed: {}", status.message()))
}
