//! Behavioural coverage for layered configuration loading.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use ortho_config::OrthoConfig;
use tdlink_config::{Config, ConfigError, LoadError, OverflowPolicy};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    validated: RefCell<Option<Result<Config, LoadError>>>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("tdlink")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            validated: RefCell::new(None),
            _guard: guard,
        }
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; the harness holds
        // the global mutex and restores every override in `Drop`.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn write_config(&self, contents: &str) {
        let path = self.temp_dir.path().join("tdlink.toml");
        if let Err(error) = fs::write(&path, contents) {
            panic!("failed to write configuration: {error}");
        }
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn load(&self) {
        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn load_validated(&self) {
        let args = self.cli_args.borrow().clone();
        *self.validated.borrow_mut() = Some(Config::load_validated_from_iter(args));
    }

    fn config(&self) -> Config {
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        self.loaded
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("configuration was not loaded"))
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(previous) => unsafe { std::env::set_var(&key, previous) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("the environment sets {key} to {value}")]
fn given_environment(harness: &Harness, key: String, value: String) {
    harness.set_env(&key, &value);
}

#[given("a configuration file selecting the disconnect overflow policy")]
fn given_disconnect_file(harness: &Harness) {
    harness.write_config("overflow_policy = \"disconnect\"\n");
}

#[when("the configuration is loaded")]
fn when_loaded(harness: &Harness) {
    harness.load();
}

#[when("the configuration is loaded and validated")]
fn when_loaded_and_validated(harness: &Harness) {
    harness.load_validated();
}

#[then("validation rejects the empty update buffer")]
fn then_empty_buffer_rejected(harness: &Harness) {
    let outcome = harness.validated.borrow();
    assert!(
        matches!(
            outcome.as_ref(),
            Some(Err(LoadError::Invalid(ConfigError::EmptyUpdateBuffer)))
        ),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("validation accepts the configuration")]
fn then_validation_accepts(harness: &Harness) {
    let outcome = harness.validated.borrow();
    assert!(
        matches!(outcome.as_ref(), Some(Ok(_))),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("the call timeout is {millis} milliseconds")]
fn then_call_timeout(harness: &Harness, millis: u64) {
    assert_eq!(harness.config().call_timeout(), Duration::from_millis(millis));
}

#[then("the overflow policy is {policy}")]
fn then_overflow_policy(harness: &Harness, policy: String) {
    let expected = policy
        .parse::<OverflowPolicy>()
        .unwrap_or_else(|error| panic!("invalid policy '{policy}': {error}"));
    assert_eq!(harness.config().overflow_policy(), expected);
}

#[scenario(
    path = "tests/features/configuration.feature",
    name = "Defaults apply when no layer sets a value"
)]
fn defaults_apply(#[from(harness)] harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration.feature",
    name = "Environment overrides the default call timeout"
)]
fn environment_overrides_defaults(#[from(harness)] harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration.feature",
    name = "A configuration file selects the disconnect policy"
)]
fn file_selects_policy(#[from(harness)] harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration.feature",
    name = "Validated loading rejects an empty update buffer"
)]
fn validated_loading_rejects_empty_buffer(#[from(harness)] harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration.feature",
    name = "Validated loading accepts the defaults"
)]
fn validated_loading_accepts_defaults(#[from(harness)] harness: Harness) {
    drop(harness);
}
