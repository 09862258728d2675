//! Shared world for dispatcher behaviour tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};

use crate::{
    Client, ClientOptions, CorrelationId, EXTRA_KEY, Envelope, InvokeError, PendingCall, Request,
    ScriptedNative, Subscription,
};

pub(super) const WAIT: Duration = Duration::from_secs(2);

type CallOutcome = Result<Envelope, InvokeError>;

pub(super) struct TestWorld {
    pub(super) native: ScriptedNative,
    client: Option<Arc<Client>>,
    pub(super) pending: HashMap<String, PendingCall>,
    pub(super) subscriptions: Vec<Subscription>,
    pub(super) outcome: Option<CallOutcome>,
    pub(super) last_id: Option<CorrelationId>,
    background: Option<JoinHandle<CallOutcome>>,
}

pub(super) fn world() -> TestWorld {
    TestWorld {
        native: ScriptedNative::new(),
        client: None,
        pending: HashMap::new(),
        subscriptions: Vec::new(),
        outcome: None,
        last_id: None,
        background: None,
    }
}

impl TestWorld {
    pub(super) fn start(&mut self) {
        let options = ClientOptions::default()
            .with_receive_timeout(Duration::from_millis(10))
            .with_call_timeout(WAIT);
        let client = Client::new(self.native.clone(), options)
            .unwrap_or_else(|error| panic!("client failed to start: {error}"));
        self.client = Some(Arc::new(client));
    }

    pub(super) fn client(&self) -> &Client {
        self.client
            .as_deref()
            .unwrap_or_else(|| panic!("client not started"))
    }

    pub(super) fn submit(&mut self, label: &str) {
        let call = self
            .client()
            .submit(&Request::new("getOption").with("name", label))
            .unwrap_or_else(|error| panic!("submit {label}: {error}"));
        self.pending.insert(label.to_owned(), call);
    }

    /// Correlation id the client stamped on the request for `label`.
    pub(super) fn sent_id(&self, label: &str) -> Value {
        self.native
            .sent()
            .into_iter()
            .find(|request| request.get("name") == Some(&json!(label)))
            .and_then(|request| request.get(EXTRA_KEY).cloned())
            .unwrap_or_else(|| panic!("no request sent for {label}"))
    }

    pub(super) fn call_in_background(&mut self) {
        let client = Arc::clone(
            self.client
                .as_ref()
                .unwrap_or_else(|| panic!("client not started")),
        );
        self.background = Some(thread::spawn(move || {
            client.invoke(&Request::new("getMe"))
        }));
        if self.native.wait_for_sent(1, WAIT).is_none() {
            panic!("background call was never sent");
        }
    }

    pub(super) fn join_background(&mut self) {
        let handle = self
            .background
            .take()
            .unwrap_or_else(|| panic!("no background call"));
        let outcome = handle
            .join()
            .unwrap_or_else(|_| panic!("background call panicked"));
        self.outcome = Some(outcome);
    }
}
