//! Request types accepted by the native library.

use serde::Serialize;

use crate::objects::{self, AuthorizationState, OptionValue, TextEntities, User};

/// Returns the current user.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetMe {}

/// Returns the current authorization state.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetAuthorizationState {}

/// Supplies library parameters while in
/// [`AuthorizationState::WaitTdlibParameters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetTdlibParameters {
    /// Use the test environment.
    pub use_test_dc: bool,
    /// Directory for persistent data.
    pub database_directory: String,
    /// Directory for downloaded files; empty means inside the database
    /// directory.
    pub files_directory: String,
    /// Encryption key for the local database, base64 encoded.
    pub database_encryption_key: String,
    /// Keep file metadata across restarts.
    pub use_file_database: bool,
    /// Keep chat and user data across restarts.
    pub use_chat_info_database: bool,
    /// Keep messages across restarts.
    pub use_message_database: bool,
    /// Enable secret chats.
    pub use_secret_chats: bool,
    /// Application identifier.
    pub api_id: i32,
    /// Application hash.
    pub api_hash: String,
    /// IETF language tag of the user's language.
    pub system_language_code: String,
    /// Model of the device.
    pub device_model: String,
    /// Operating system version; empty lets the library detect it.
    pub system_version: String,
    /// Application version.
    pub application_version: String,
}

impl SetTdlibParameters {
    /// Parameters with the given credentials and library defaults elsewhere.
    #[must_use]
    pub fn new(api_id: i32, api_hash: impl Into<String>, database_directory: impl Into<String>) -> Self {
        Self {
            use_test_dc: false,
            database_directory: database_directory.into(),
            files_directory: String::new(),
            database_encryption_key: String::new(),
            use_file_database: true,
            use_chat_info_database: true,
            use_message_database: true,
            use_secret_chats: false,
            api_id,
            api_hash: api_hash.into(),
            system_language_code: String::from("en"),
            device_model: String::from("tdlink"),
            system_version: String::new(),
            application_version: String::from(env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Supplies the phone number while in
/// [`AuthorizationState::WaitPhoneNumber`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetAuthenticationPhoneNumber {
    /// Phone number in international format.
    pub phone_number: String,
}

/// Supplies the confirmation code while in
/// [`AuthorizationState::WaitCode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckAuthenticationCode {
    /// The code.
    pub code: String,
}

/// Supplies the password while in [`AuthorizationState::WaitPassword`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckAuthenticationPassword {
    /// The password.
    pub password: String,
}

/// Reads a library option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetOption {
    /// Option name.
    pub name: String,
}

/// Changes the verbosity of the library's internal log. Can be executed
/// synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetLogVerbosityLevel {
    /// New verbosity, 0 to 1023.
    pub new_verbosity_level: i32,
}

/// Finds entities in text. Can be executed synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetTextEntities {
    /// Text to scan.
    pub text: String,
}

/// Closes the library instance after flushing its databases.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Close {}

/// Logs the current user out and closes the instance.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LogOut {}

tl_function! {
    GetMe => "getMe" -> User,
    GetAuthorizationState => "getAuthorizationState" -> AuthorizationState,
    SetTdlibParameters => "setTdlibParameters" -> objects::Ok,
    SetAuthenticationPhoneNumber => "setAuthenticationPhoneNumber" -> objects::Ok,
    CheckAuthenticationCode => "checkAuthenticationCode" -> objects::Ok,
    CheckAuthenticationPassword => "checkAuthenticationPassword" -> objects::Ok,
    GetOption => "getOption" -> OptionValue,
    SetLogVerbosityLevel => "setLogVerbosityLevel" -> objects::Ok,
    GetTextEntities => "getTextEntities" -> TextEntities,
    Close => "close" -> objects::Ok,
    LogOut => "logOut" -> objects::Ok,
}
