//! Drives the login flow from updates.
//!
//! [`authorize`] subscribes to updates, asks for the current authorization
//! state, and answers every prompt through an [`AuthorizationHandler`] until
//! the session is ready. A repeated state is only handled once, except after
//! the library rejected an answer, in which case the handler is asked again.


use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use tdlink::{Client, InvokeError, RecvError, Subscription};

use crate::functions::{
    CheckAuthenticationCode, CheckAuthenticationPassword, GetAuthorizationState,
    SetAuthenticationPhoneNumber, SetTdlibParameters,
};
use crate::objects::{AuthorizationState, AuthorizationStateWaitCode, AuthorizationStateWaitPassword};
use crate::updates::{Update, UpdateAuthorizationState};

const AUTH_TARGET: &str = "tdlink_api::authorization";

/// Errors ending the login flow.
#[derive(Debug, Clone, Error)]
pub enum AuthorizationError {
    /// The library moved to a state that cannot lead to authorisation.
    #[error("authorization aborted in state '{state}'")]
    Aborted {
        /// Discriminator of the terminal state.
        state: &'static str,
    },
    /// A call to the library failed.
    #[error(transparent)]
    Client(#[from] InvokeError),
    /// The update stream ended before the session was ready.
    #[error("update stream closed before authorization completed")]
    StreamClosed,
    /// The session did not become ready in time.
    #[error("authorization did not complete within {}ms", timeout.as_millis())]
    Timeout {
        /// Overall deadline.
        timeout: Duration,
    },
    /// The handler has no answer for a prompt.
    #[error("no {what} available for authorization")]
    MissingCredential {
        /// The missing item.
        what: &'static str,
    },
}

/// Supplies answers to login prompts.
#[cfg_attr(test, mockall::automock)]
pub trait AuthorizationHandler {
    /// Library parameters for a fresh instance.
    ///
    /// # Errors
    ///
    /// Any error aborts the flow.
    fn tdlib_parameters(&mut self) -> Result<SetTdlibParameters, AuthorizationError>;

    /// Phone number to log in with.
    ///
    /// # Errors
    ///
    /// Any error aborts the flow.
    fn phone_number(&mut self) -> Result<String, AuthorizationError>;

    /// Confirmation code sent to the user.
    ///
    /// # Errors
    ///
    /// Any error aborts the flow.
    fn code(&mut self, prompt: &AuthorizationStateWaitCode) -> Result<String, AuthorizationError>;

    /// Two-step verification password.
    ///
    /// # Errors
    ///
    /// Any error aborts the flow.
    fn password(
        &mut self,
        prompt: &AuthorizationStateWaitPassword,
    ) -> Result<String, AuthorizationError>;

    /// Called when the library rejects an answer; the prompt is repeated.
    fn rejected(&mut self, state: &AuthorizationState, error: &InvokeError) {
        let _ = (state, error);
    }
}

/// Runs the login flow until the session is ready.
///
/// The deadline covers the whole flow, including answers the library
/// rejects. A `timeout` too large to represent as a deadline never expires.
///
/// # Errors
///
/// Returns [`AuthorizationError::Aborted`] when the library starts closing or
/// logging out, [`AuthorizationError::Timeout`] when `timeout` elapses first
/// and any error raised by the handler or by a call other than a rejected
/// answer.
pub fn authorize<H>(
    client: &Client,
    handler: &mut H,
    timeout: Duration,
) -> Result<(), AuthorizationError>
where
    H: AuthorizationHandler + ?Sized,
{
    let deadline = Instant::now().checked_add(timeout);
    let subscription = client.subscribe();
    let mut state = client.call(&GetAuthorizationState::default())?;
    let mut handled: Option<AuthorizationState> = None;
    loop {
        if handled.as_ref() != Some(&state) {
            debug!(target: AUTH_TARGET, state = state.type_name(), "authorization state");
            match answer(client, handler, &state)? {
                Step::Done => {
                    info!(target: AUTH_TARGET, "authorization complete");
                    return Ok(());
                }
                Step::Answered => handled = Some(state.clone()),
                Step::Rejected => {
                    remaining(deadline, timeout)?;
                    continue;
                }
            }
        }
        state = next_state(client, &subscription, deadline, timeout)?;
    }
}

/// Time left before `deadline`; `None` when there is no deadline.
fn remaining(
    deadline: Option<Instant>,
    timeout: Duration,
) -> Result<Option<Duration>, AuthorizationError> {
    deadline
        .map(|at| {
            at.checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or(AuthorizationError::Timeout { timeout })
        })
        .transpose()
}

enum Step {
    Answered,
    Rejected,
    Done,
}

fn answer<H>(
    client: &Client,
    handler: &mut H,
    state: &AuthorizationState,
) -> Result<Step, AuthorizationError>
where
    H: AuthorizationHandler + ?Sized,
{
    let submitted = match state {
        AuthorizationState::Ready => return Ok(Step::Done),
        AuthorizationState::LoggingOut
        | AuthorizationState::Closing
        | AuthorizationState::Closed => {
            return Err(AuthorizationError::Aborted {
                state: state.type_name(),
            });
        }
        AuthorizationState::WaitTdlibParameters => {
            client.call(&handler.tdlib_parameters()?).map(drop)
        }
        AuthorizationState::WaitPhoneNumber => client
            .call(&SetAuthenticationPhoneNumber {
                phone_number: handler.phone_number()?,
            })
            .map(drop),
        AuthorizationState::WaitCode(prompt) => client
            .call(&CheckAuthenticationCode {
                code: handler.code(prompt)?,
            })
            .map(drop),
        AuthorizationState::WaitPassword(prompt) => client
            .call(&CheckAuthenticationPassword {
                password: handler.password(prompt)?,
            })
            .map(drop),
    };
    match submitted {
        Ok(()) => Ok(Step::Answered),
        Err(error @ InvokeError::Protocol { .. }) => {
            warn!(
                target: AUTH_TARGET,
                state = state.type_name(),
                error = %error,
                "answer rejected"
            );
            handler.rejected(state, &error);
            Ok(Step::Rejected)
        }
        Err(error) => Err(error.into()),
    }
}

/// Waits for the next authorization state update.
fn next_state(
    client: &Client,
    subscription: &Subscription,
    deadline: Option<Instant>,
    timeout: Duration,
) -> Result<AuthorizationState, AuthorizationError> {
    loop {
        let received = match remaining(deadline, timeout)? {
            Some(left) => subscription.recv_timeout(left),
            None => subscription.recv(),
        };
        match received {
            Ok(raw) => match Update::try_from(&raw) {
                Ok(Update::AuthorizationState(UpdateAuthorizationState {
                    authorization_state,
                })) => return Ok(authorization_state),
                Ok(_) => {}
                Err(error) => {
                    debug!(
                        target: AUTH_TARGET,
                        type_name = raw.type_name(),
                        error = %error,
                        "skipping update"
                    );
                }
            },
            Err(RecvError::Lagged(missed)) => {
                warn!(target: AUTH_TARGET, missed, "updates missed, re-reading state");
                return Ok(client.call(&GetAuthorizationState::default())?);
            }
            Err(RecvError::Timeout | RecvError::Empty) => {
                return Err(AuthorizationError::Timeout { timeout });
            }
            Err(RecvError::Closed) => return Err(AuthorizationError::StreamClosed),
        }
    }
}

/// Handler answering from fixed credentials.
#[derive(Debug, Clone)]
pub struct CredentialsAuthorizer {
    parameters: SetTdlibParameters,
    phone_number: String,
    code: Option<String>,
    password: Option<String>,
}

impl CredentialsAuthorizer {
    /// Credentials without a code or password.
    #[must_use]
    pub fn new(parameters: SetTdlibParameters, phone_number: impl Into<String>) -> Self {
        Self {
            parameters,
            phone_number: phone_number.into(),
            code: None,
            password: None,
        }
    }

    /// Sets the confirmation code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the two-step verification password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl AuthorizationHandler for CredentialsAuthorizer {
    fn tdlib_parameters(&mut self) -> Result<SetTdlibParameters, AuthorizationError> {
        Ok(self.parameters.clone())
    }

    fn phone_number(&mut self) -> Result<String, AuthorizationError> {
        Ok(self.phone_number.clone())
    }

    fn code(&mut self, _prompt: &AuthorizationStateWaitCode) -> Result<String, AuthorizationError> {
        self.code
            .clone()
            .ok_or(AuthorizationError::MissingCredential {
                what: "confirmation code",
            })
    }

    fn password(
        &mut self,
        _prompt: &AuthorizationStateWaitPassword,
    ) -> Result<String, AuthorizationError> {
        self.password
            .clone()
            .ok_or(AuthorizationError::MissingCredential { what: "password" })
    }

    fn rejected(&mut self, _state: &AuthorizationState, _error: &InvokeError) {
        // A fixed answer will be rejected again.
        self.code = None;
        self.password = None;
    }
}
