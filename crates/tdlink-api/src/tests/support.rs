//! A scripted native library that walks through the login states.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use tdlink::{Client, ClientOptions, ScriptedNative, TYPE_KEY, reply_to};

/// Simulated library: answers login requests and emits state updates.
#[derive(Clone)]
pub(crate) struct FakeLibrary {
    pub(crate) native: ScriptedNative,
    inner: Arc<Mutex<Script>>,
}

struct Script {
    state: Value,
    code: String,
    password: Option<String>,
}

impl FakeLibrary {
    pub(crate) fn new(initial: &str, code: &str) -> Self {
        let library = Self {
            native: ScriptedNative::new(),
            inner: Arc::new(Mutex::new(Script {
                state: json!({ "@type": initial }),
                code: code.to_owned(),
                password: None,
            })),
        };
        let script = Arc::clone(&library.inner);
        library
            .native
            .set_responder(move |request| respond(&script, request));
        library
    }

    /// Requires a two-step verification password after the code.
    pub(crate) fn with_password(self, password: &str) -> Self {
        self.script().password = Some(password.to_owned());
        self
    }

    pub(crate) fn client(&self) -> Client {
        let options = ClientOptions::default()
            .with_receive_timeout(Duration::from_millis(10))
            .with_call_timeout(Duration::from_secs(2));
        Client::new(self.native.clone(), options)
            .unwrap_or_else(|error| panic!("client failed to start: {error}"))
    }

    /// Requests of the given type sent so far.
    pub(crate) fn requests(&self, type_name: &str) -> Vec<Value> {
        self.native
            .sent()
            .into_iter()
            .filter(|request| request.get(TYPE_KEY) == Some(&json!(type_name)))
            .collect()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn respond(shared: &Mutex<Script>, request: &Value) -> Vec<Value> {
    let mut script = shared.lock().unwrap_or_else(PoisonError::into_inner);
    let current = script
        .state
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let requested = request
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let next = match (requested, current.as_str()) {
        ("getAuthorizationState", _) => {
            return vec![reply_to(request, script.state.clone())];
        }
        ("setTdlibParameters", "authorizationStateWaitTdlibParameters") => {
            json!({"@type": "authorizationStateWaitPhoneNumber"})
        }
        ("setAuthenticationPhoneNumber", "authorizationStateWaitPhoneNumber") => {
            json!({"@type": "authorizationStateWaitCode", "code_info": {"@type": "authenticationCodeInfo"}})
        }
        ("checkAuthenticationCode", "authorizationStateWaitCode") => {
            if request.get("code") != Some(&json!(script.code)) {
                return vec![error(request, "PHONE_CODE_INVALID")];
            }
            script.password.as_ref().map_or_else(
                || json!({"@type": "authorizationStateReady"}),
                |_| json!({"@type": "authorizationStateWaitPassword", "password_hint": "usual"}),
            )
        }
        ("checkAuthenticationPassword", "authorizationStateWaitPassword") => {
            if request.get("password").and_then(Value::as_str) != script.password.as_deref() {
                return vec![error(request, "PASSWORD_HASH_INVALID")];
            }
            json!({"@type": "authorizationStateReady"})
        }
        _ => return vec![error(request, "UNEXPECTED_REQUEST")],
    };
    script.state = next.clone();
    vec![
        reply_to(request, json!({"@type": "ok"})),
        json!({"@type": "updateAuthorizationState", "authorization_state": next}),
    ]
}

fn error(request: &Value, message: &str) -> Value {
    reply_to(
        request,
        json!({"@type": "error", "code": 400, "message": message}),
    )
}
