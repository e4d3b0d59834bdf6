#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use serde_json::json;

use exowamp::Peer;
use exowamp::Procedure;
use exowamp::endpoints::CallEndpoint;
use exowamp::endpoints::PieceByPieceEndpoint;
use exowamp::entrypoints::CallEntrypoint;
use exowamp::entrypoints::Entrypoint;
use exowamp::entrypoints::Inbound;
use exowamp::entrypoints::StreamEntrypoint;
use exowamp::mock_transport::DuplexTransport;
use exowamp::peer::Response;
use exowamp::session::REGISTER;
use exowamp::session::SUBSCRIBE;
use exowamp::session::UNREGISTER;
use exowamp::session::UNSUBSCRIBE;
use exowamp::shared::Queue;
use neowamp::CallEvent;
use neowamp::CallFeatures;
use neowamp::ErrorEvent;
use neowamp::NewResourcePayload;
use neowamp::PublishEvent;
use neowamp::PublishFeatures;
use neowamp::ReplyEvent;
use neowamp::Resource;
use neowamp::Route;
use neowamp::new_id;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// A minimal router: it owns resources, serves its own procedures and lets
/// tests reach into the client through routed events.
#[derive(Clone)]
pub struct FakeRouter {
    pub peer: Peer,
    pub resources: Arc<DashMap<String, Resource>>,
    procedures: Arc<DashMap<String, Entrypoint>>,
    pub published: Arc<Queue<PublishEvent, ()>>,
}

impl FakeRouter {
    pub fn spawn(transport: DuplexTransport) -> Self {
        let router = Self {
            peer: Peer::spawn("router", Box::new(transport)),
            resources: Arc::new(DashMap::new()),
            procedures: Arc::new(DashMap::new()),
            published: Arc::new(Queue::new()),
        };

        let handler = router.clone();
        router.peer.incoming_call_events().observe(move |call| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.answer(call).await });
        });

        let published = router.published.clone();
        router.peer.incoming_publish_events().observe(move |event| published.put(event));

        router
    }

    /// Serves `procedure` under `uri` to callers.
    pub fn serve(&self, uri: &str, procedure: Procedure) {
        let entrypoint = match procedure {
            Procedure::Call(p) => Entrypoint::Call(CallEntrypoint::new(self.peer.clone(), CallEndpoint::new(p))),
            Procedure::Stream(p) => {
                Entrypoint::Stream(StreamEntrypoint::new(self.peer.clone(), PieceByPieceEndpoint::new(p)))
            }
        };
        self.procedures.insert(uri.to_string(), entrypoint);
    }

    async fn answer(&self, call: CallEvent) {
        let uri = call.features.uri.clone();
        let answer: neowamp::Event = match uri.as_str() {
            SUBSCRIBE | REGISTER => {
                let request: NewResourcePayload = serde_json::from_value(call.payload.clone()).unwrap();
                let resource = Resource {
                    id: new_id(),
                    uri: request.uri,
                    author_id: "client".into(),
                    options: request.options,
                };
                self.resources.insert(resource.id.clone(), resource.clone());
                ReplyEvent::new(&call.id, serde_json::to_value(resource).unwrap()).into()
            }
            UNSUBSCRIBE | UNREGISTER => {
                let id = call.payload.as_str().unwrap_or_default().to_string();
                match self.resources.remove(&id) {
                    Some(_) => ReplyEvent::new(&call.id, Value::Null).into(),
                    None => ErrorEvent::new(&call.id, "ResourceNotFound", id).into(),
                }
            }
            _ => {
                let entrypoint = self.procedures.get(&uri).map(|e| e.value().clone());
                match entrypoint {
                    Some(entrypoint) => return entrypoint.handle(Inbound::Call(call)).await,
                    None => ErrorEvent::new(&call.id, "ProcedureNotFound", uri.clone()).into(),
                }
            }
        };
        let _ = self.peer.send(answer).await;
    }

    pub fn resource_for(&self, uri: &str) -> Option<Resource> {
        self.resources
            .iter()
            .find(|entry| entry.value().uri == uri)
            .map(|entry| entry.value().clone())
    }

    /// Delivers a publication to the client's subscription on `uri`.
    pub async fn publish_to(&self, uri: &str, payload: Value) {
        let resource = self.resource_for(uri).expect("no subscription");
        let mut event = PublishEvent::new(PublishFeatures::new(uri), payload);
        event.route = Some(Route::to_endpoint(resource.id));
        self.peer.send(event).await.unwrap();
    }

    /// Invokes the client's registration on `uri` and waits for the first
    /// answer.
    pub async fn call_into(&self, uri: &str, payload: Value) -> Response {
        let resource = self.resource_for(uri).expect("no registration");
        let mut call = CallEvent::new(CallFeatures::new(uri, Duration::from_secs(60)), payload);
        call.route = Some(Route::to_endpoint(resource.id));
        self.exchange(call).await
    }

    /// Sends `event` and waits for the answer keyed by its id.
    pub async fn exchange(&self, event: impl Into<neowamp::Event>) -> Response {
        let event = event.into();
        let response = self.peer.pending_reply_events().create(event.id()).unwrap();
        self.peer.send(event).await.unwrap();
        tokio::time::timeout(WAIT, response).await.unwrap().unwrap()
    }
}

pub fn countdown_stream(call: CallEvent) -> impl futures::Stream<Item = anyhow::Result<Value>> {
    let start = call.payload.as_i64().unwrap_or(0);
    futures::stream::iter((0..=start).rev().map(|n| Ok::<_, anyhow::Error>(json!(n))))
}
