#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod config;
pub mod event;
pub mod listing;
pub mod model;
pub mod session;

use crux_kv::error::KeyValueError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::AppConfig;
pub use crux_core::App as CruxApp;
pub use event::{CaseDraft, CaseId, LoginForm, Secret, UserDraft, UserId, Username, ValidationError};
pub use listing::{derive_view, ListAction, ListController, ListQuery, ListView, Listed};
pub use model::{CaseField, CaseRecord, UserField, UserRecord};
pub use session::{Credentials, RequestId, Session};

use capabilities::{Fault, HttpOutcome, KvError, ValidatedUrl};
use session::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidCredentials,
    SessionExpired,
    Validation,
    Forbidden,
    Storage,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Validation => "VALIDATION_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::Storage => "STORAGE_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Storage | Self::Unknown => ErrorSeverity::Transient,
            Self::InvalidCredentials | Self::Validation | Self::Forbidden => {
                ErrorSeverity::Permanent
            }
            Self::SessionExpired => ErrorSeverity::Fatal,
        }
    }
}

/// Error tokens surfaced to the shell, one per failure the user can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorToken {
    InvalidCredentials,
    LoginUnknownError,
    RefreshTokenOutdated,
    GetCurrentUserUnknownError,
    GetListUnknownError,
    EmptyInputError,
    SyntaxError,
    RepeatedIDError,
    NotFoundError,
    AddUnknownError,
    EditUnknownError,
    DeleteUnknownError,
    NotAdminError,
    StorageError,
}

impl ErrorToken {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "InvalidCredentials",
            Self::LoginUnknownError => "LoginUnknownError",
            Self::RefreshTokenOutdated => "RefreshTokenOutdated",
            Self::GetCurrentUserUnknownError => "GetCurrentUserUnknownError",
            Self::GetListUnknownError => "GetListUnknownError",
            Self::EmptyInputError => "EmptyInputError",
            Self::SyntaxError => "SyntaxError",
            Self::RepeatedIDError => "RepeatedIDError",
            Self::NotFoundError => "NotFoundError",
            Self::AddUnknownError => "AddUnknownError",
            Self::EditUnknownError => "EditUnknownError",
            Self::DeleteUnknownError => "DeleteUnknownError",
            Self::NotAdminError => "NotAdminError",
            Self::StorageError => "StorageError",
        }
    }

    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::RefreshTokenOutdated => ErrorKind::SessionExpired,
            Self::EmptyInputError
            | Self::SyntaxError
            | Self::RepeatedIDError
            | Self::NotFoundError => ErrorKind::Validation,
            Self::NotAdminError => ErrorKind::Forbidden,
            Self::StorageError => ErrorKind::Storage,
            Self::LoginUnknownError
            | Self::GetCurrentUserUnknownError
            | Self::GetListUnknownError
            | Self::AddUnknownError
            | Self::EditUnknownError
            | Self::DeleteUnknownError => ErrorKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub token: ErrorToken,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(token: ErrorToken, message: impl Into<String>) -> Self {
        let kind = token.kind();
        Self {
            kind,
            token,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    /// A failed backend call, reported under `token`.
    #[must_use]
    pub fn from_fault(token: ErrorToken, fault: &Fault) -> Self {
        let error = Self::new(token, fault.to_string());
        match fault.status() {
            Some(status) => error.with_context("http_status", status.to_string()),
            None => error,
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.token {
            ErrorToken::InvalidCredentials => {
                "Login failed, the username or password is incorrect or does not exist.".into()
            }
            ErrorToken::LoginUnknownError => "Unknown error occurs when logging in.".into(),
            ErrorToken::RefreshTokenOutdated => {
                match self
                    .context
                    .get("redirect_after_ms")
                    .and_then(|ms| ms.parse::<u64>().ok())
                {
                    Some(ms) => format!(
                        "Your session has expired, returning to the login page in {}s.",
                        ms.div_ceil(1000)
                    ),
                    None => "Your session has expired, please log in again.".into(),
                }
            }
            ErrorToken::GetCurrentUserUnknownError => {
                "Unknown error occurs when getting current user info.".into()
            }
            ErrorToken::GetListUnknownError => "Unknown error occurs when getting the list.".into(),
            ErrorToken::EmptyInputError
            | ErrorToken::SyntaxError
            | ErrorToken::RepeatedIDError
            | ErrorToken::NotFoundError => self.message.clone(),
            ErrorToken::AddUnknownError => "Unknown error occurs when adding the record.".into(),
            ErrorToken::EditUnknownError => "Unknown error occurs when editing the record.".into(),
            ErrorToken::DeleteUnknownError => {
                "Unknown error occurs when deleting the record.".into()
            }
            ErrorToken::NotAdminError => "Only administrators can open the admin console.".into(),
            ErrorToken::StorageError => "Unable to save your login locally.".into(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        let token = match &e {
            ValidationError::EmptyInput { .. } => ErrorToken::EmptyInputError,
            ValidationError::Syntax { .. } => ErrorToken::SyntaxError,
            ValidationError::RepeatedId(_) => ErrorToken::RepeatedIDError,
            ValidationError::MissingRecord(_) => ErrorToken::NotFoundError,
        };
        Self::new(token, e.to_string())
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        Self::new(ErrorToken::StorageError, "credential storage failed").with_internal(e.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.code(), self.token.as_str(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
    deadline: Deadline,
}

impl ToastMessage {
    /// Counts down from `now_ms`, or from the next tick when no time is known.
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind, now_ms: Option<u64>) -> Self {
        let duration_ms = kind.default_duration_ms();
        Self {
            message: message.into(),
            kind,
            duration_ms,
            deadline: Deadline::after(duration_ms, now_ms),
        }
    }

    pub fn poll_expired(&mut self, now_ms: u64) -> bool {
        self.deadline.poll(now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Page {
    #[default]
    Login,
    Workspace,
    AdminConsole,
}

#[derive(Debug)]
pub struct Model {
    pub config: AppConfig,
    pub base_url: Option<ValidatedUrl>,
    pub page: Page,
    pub session: Session,
    pub current_user: Option<UserRecord>,
    pub cases: ListController<CaseRecord>,
    pub users: ListController<UserRecord>,
    pub credentials_loaded: bool,
    pub login_in_flight: bool,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
}

impl Default for Model {
    fn default() -> Self {
        let config = AppConfig::default();
        let base_url = config.validate().ok();
        Self {
            config,
            base_url,
            page: Page::default(),
            session: Session::default(),
            current_user: None,
            cases: ListController::default(),
            users: ListController::default(),
            credentials_loaded: false,
            login_in_flight: false,
            active_error: None,
            active_toast: None,
        }
    }
}

impl Model {
    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind, self.session.clock_ms()));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.session.credentials().is_empty()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.current_user
            .as_ref()
            .is_some_and(UserRecord::is_administrator)
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<UserId> {
        self.current_user.as_ref().map(|u| u.user_id)
    }
}

#[derive(Debug, Clone, Default)]
pub enum Event {
    #[default]
    Noop,

    AppStarted,
    Configure(AppConfig),
    CredentialsLoaded(Result<Option<Vec<u8>>, KeyValueError>),
    CredentialsStored(Result<Option<Vec<u8>>, KeyValueError>),

    LoginRequested(LoginForm),
    LogoutRequested,
    Navigate(Page),

    Cases(ListAction<CaseRecord>),
    Users(ListAction<UserRecord>),

    ResponseReceived {
        request_id: RequestId,
        outcome: Box<HttpOutcome>,
    },

    DismissError,
    DismissToast,
    /// Shell clock, in milliseconds. Drives request timeouts, the
    /// session-expiry redirect and toast expiry.
    TimerTick {
        now_ms: u64,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::AppStarted => "app_started",
            Self::Configure(_) => "configure",
            Self::CredentialsLoaded(_) => "credentials_loaded",
            Self::CredentialsStored(_) => "credentials_stored",
            Self::LoginRequested(_) => "login_requested",
            Self::LogoutRequested => "logout_requested",
            Self::Navigate(_) => "navigate",
            Self::Cases(_) => "cases",
            Self::Users(_) => "users",
            Self::ResponseReceived { .. } => "response_received",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
            Self::TimerTick { .. } => "timer_tick",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::LoginRequested(_)
                | Self::LogoutRequested
                | Self::Navigate(_)
                | Self::Cases(_)
                | Self::Users(_)
                | Self::DismissError
                | Self::DismissToast
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub token: ErrorToken,
    pub is_transient: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            token: e.token,
            is_transient: e.severity == ErrorSeverity::Transient,
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CurrentUserView {
    pub user_id: UserId,
    pub username: Username,
    pub is_admin: bool,
}

/// One rendered page of a listed resource plus the query that produced it.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TableView<R: Listed> {
    #[serde(flatten)]
    pub view: ListView<R>,
    pub query: ListQuery<R::Field>,
    pub is_loading: bool,
}

impl<R: Listed> TableView<R> {
    fn of(controller: &ListController<R>, page_size: usize) -> Self {
        Self {
            view: controller.view(page_size),
            query: controller.query().clone(),
            is_loading: controller.is_loading(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ViewModel {
    pub page: Page,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
    pub is_authenticated: bool,
    pub is_ready: bool,
    pub is_logging_in: bool,
    pub session_expiring: bool,
    pub current_user: Option<CurrentUserView>,
    pub cases: TableView<CaseRecord>,
    pub users: TableView<UserRecord>,
}

pub mod app {
    use super::*;
    use crate::capabilities::{
        decode_json, expect_success, CapabilityError, KeyNamespace, TypedKvStore,
    };
    use crate::model::{
        CaseListResponse, CurrentUserResponse, LoginResponse, RefreshResponse, UserListResponse,
    };
    use crate::session::{ApiCall, Attempt, Outbound, RefreshDecision};
    use tracing::{debug, info, warn};

    #[derive(Default)]
    pub struct App;

    /// Per-resource wiring between a [`ListController`] and backend calls.
    trait Resource: Listed {
        const LABEL: &'static str;

        fn controller(model: &mut Model) -> &mut ListController<Self>;
        fn list_call() -> ApiCall;
        fn create_call(draft: Self::Draft) -> ApiCall;
        /// `None` when the backend has no update route for this resource.
        fn update_call(id: Self::Id, draft: Self::Draft) -> Option<ApiCall>;
        fn delete_call(id: Self::Id) -> ApiCall;
    }

    impl Resource for CaseRecord {
        const LABEL: &'static str = "cases";

        fn controller(model: &mut Model) -> &mut ListController<Self> {
            &mut model.cases
        }

        fn list_call() -> ApiCall {
            ApiCall::ListCases
        }

        fn create_call(draft: CaseDraft) -> ApiCall {
            ApiCall::CreateCase(draft)
        }

        fn update_call(case_id: CaseId, draft: CaseDraft) -> Option<ApiCall> {
            Some(ApiCall::UpdateCase { case_id, draft })
        }

        fn delete_call(case_id: CaseId) -> ApiCall {
            ApiCall::DeleteCase(case_id)
        }
    }

    impl Resource for UserRecord {
        const LABEL: &'static str = "users";

        fn controller(model: &mut Model) -> &mut ListController<Self> {
            &mut model.users
        }

        fn list_call() -> ApiCall {
            ApiCall::ListUsers
        }

        fn create_call(draft: UserDraft) -> ApiCall {
            ApiCall::CreateUser(draft)
        }

        fn update_call(_: UserId, _: UserDraft) -> Option<ApiCall> {
            None
        }

        fn delete_call(user_id: UserId) -> ApiCall {
            ApiCall::DeleteUser(user_id)
        }
    }

    impl App {
        fn credentials_store(model: &Model) -> Result<TypedKvStore<Credentials>, KvError> {
            TypedKvStore::new(KeyNamespace::Session, model.config.credentials_key.as_str())
        }

        fn load_credentials(model: &mut Model, caps: &Capabilities) {
            match Self::credentials_store(model) {
                Ok(store) => caps
                    .key_value
                    .get(store.raw_key(), Event::CredentialsLoaded),
                Err(e) => {
                    warn!(error = %e, "credential key rejected, starting signed out");
                    Self::restore_session(Credentials::default(), model, caps);
                }
            }
        }

        /// Writes the current pair through to storage.
        fn persist_credentials(model: &Model, caps: &Capabilities) -> Result<(), CapabilityError> {
            let store = Self::credentials_store(model)?;
            let bytes = store.encode(model.session.credentials())?;
            caps.key_value
                .set(store.raw_key(), bytes, Event::CredentialsStored);
            Ok(())
        }

        fn persist_or_report(model: &mut Model, caps: &Capabilities) {
            if let Err(e) = Self::persist_credentials(model, caps) {
                warn!(error = %e, "failed to persist credentials");
                model.set_error(
                    AppError::new(ErrorToken::StorageError, "credential storage failed")
                        .with_internal(e.to_string()),
                );
            }
        }

        fn restore_session(credentials: Credentials, model: &mut Model, caps: &Capabilities) {
            model.credentials_loaded = true;
            if credentials.is_empty() {
                info!("no stored session");
                model.page = Page::Login;
                return;
            }
            info!("resuming stored session");
            model.session.set_credentials(credentials);
            Self::enter_workspace(model, caps);
        }

        fn enter_workspace(model: &mut Model, caps: &Capabilities) {
            model.page = Page::Workspace;
            Self::dispatch(ApiCall::CurrentUser, model, caps);
            Self::refresh_list::<CaseRecord>(model, caps);
        }

        fn refresh_list<R: Resource>(model: &mut Model, caps: &Capabilities) {
            R::controller(model).begin_refresh();
            Self::dispatch(R::list_call(), model, caps);
        }

        /// Drops all session state and returns to the login page.
        fn end_session(model: &mut Model, caps: &Capabilities) {
            model.session.end();
            model.cases.clear();
            model.users.clear();
            model.current_user = None;
            model.login_in_flight = false;
            model.clear_error();
            model.page = Page::Login;
            Self::persist_or_report(model, caps);
        }

        fn dispatch(call: ApiCall, model: &mut Model, caps: &Capabilities) {
            Self::send(Outbound::first(call), model, caps);
        }

        fn send(outbound: Outbound, model: &mut Model, caps: &Capabilities) {
            let name = outbound.name();
            if let Err(e) = Self::try_send(outbound.clone(), model, caps) {
                warn!(call = name, error = %e, "request could not be built");
                let fault = match e {
                    CapabilityError::Http(fault) => fault,
                    other => Fault::InvalidRequest(other.to_string()),
                };
                Self::handle_outcome(outbound, Err(fault), model, caps);
            }
        }

        fn try_send(
            outbound: Outbound,
            model: &mut Model,
            caps: &Capabilities,
        ) -> Result<RequestId, CapabilityError> {
            let base_url = model
                .base_url
                .as_ref()
                .ok_or_else(|| Fault::InvalidRequest("no backend configured".into()))?;
            let endpoint = outbound.endpoint();
            let url = base_url.join(&endpoint.path)?;

            let mut request = caps.http.request(endpoint.method.into(), url);
            if let Some(bearer) = model.session.credentials().bearer(endpoint.auth) {
                request = request.header("Authorization", bearer);
            }
            if let Some(payload) = outbound.payload() {
                request = request
                    .body_json(&payload)
                    .map_err(|e| Fault::from(&e))?;
            }

            let name = outbound.name();
            let request_id = model
                .session
                .begin(outbound, model.config.request_timeout_ms);
            debug!(call = name, %request_id, path = endpoint.path.as_str(), "request sent");
            request.send(move |outcome| Event::ResponseReceived {
                request_id,
                outcome: Box::new(outcome),
            });
            Ok(request_id)
        }

        /// Routes a completion, or a synthesized failure, to its handler.
        fn handle_outcome(
            outbound: Outbound,
            outcome: Result<HttpOutcome, Fault>,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match outbound {
                Outbound::Login(_) => Self::login_completed(outcome, model, caps),
                Outbound::Refresh => Self::refresh_completed(outcome, model, caps),
                Outbound::Api { call, attempt } => {
                    Self::api_completed(call, attempt, outcome, model, caps);
                }
            }
        }

        fn login_completed(
            outcome: Result<HttpOutcome, Fault>,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            model.login_in_flight = false;
            match outcome.and_then(decode_json::<LoginResponse>) {
                Ok(tokens) => {
                    info!("login succeeded");
                    let credentials = Credentials::new(tokens.access_token, tokens.refresh_token);
                    for call in model.session.start(credentials) {
                        Self::abandon(&call, model);
                    }
                    Self::persist_or_report(model, caps);
                    model.cases.clear();
                    model.users.clear();
                    model.current_user = None;
                    model.clear_error();
                    model.show_toast("Login successful", ToastKind::Success);
                    Self::enter_workspace(model, caps);
                }
                Err(fault @ Fault::BadRequest { .. }) => {
                    info!("login rejected");
                    model.set_error(AppError::from_fault(ErrorToken::InvalidCredentials, &fault));
                }
                Err(fault) => {
                    warn!(error = %fault, "login failed");
                    model.set_error(AppError::from_fault(ErrorToken::LoginUnknownError, &fault));
                }
            }
        }

        fn refresh_completed(
            outcome: Result<HttpOutcome, Fault>,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match outcome.and_then(decode_json::<RefreshResponse>) {
                Ok(refreshed) => {
                    let resend = model.session.on_refresh_succeeded(refreshed.access_token);
                    info!(retrying = resend.len(), "access token refreshed");
                    Self::persist_or_report(model, caps);
                    for call in resend {
                        Self::send(
                            Outbound::Api {
                                call,
                                attempt: Attempt::Retry,
                            },
                            model,
                            caps,
                        );
                    }
                }
                Err(fault) => {
                    warn!(error = %fault, "token refresh failed");
                    Self::session_expired(model, &fault);
                }
            }
        }

        /// Reports the expired session and arms the redirect to login.
        fn session_expired(model: &mut Model, fault: &Fault) {
            let delay_ms = model.config.session_redirect_delay_ms;
            for call in model.session.on_refresh_failed(delay_ms) {
                Self::abandon(&call, model);
            }
            model.set_error(
                AppError::from_fault(ErrorToken::RefreshTokenOutdated, fault)
                    .with_context("redirect_after_ms", delay_ms.to_string()),
            );
        }

        fn api_completed(
            call: ApiCall,
            attempt: Attempt,
            outcome: Result<HttpOutcome, Fault>,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            let result =
                outcome.and_then(|outcome| Self::api_succeeded(&call, outcome, model, caps));
            match result {
                Ok(()) => {}
                Err(fault) if fault.is_unauthorized() => {
                    Self::unauthorized(call, attempt, &fault, model, caps);
                }
                Err(fault) => {
                    warn!(call = call.name(), status = ?fault.status(), error = %fault, "call failed");
                    Self::abandon(&call, model);
                    model.set_error(AppError::from_fault(failure_token(&call), &fault));
                }
            }
        }

        fn unauthorized(
            call: ApiCall,
            attempt: Attempt,
            fault: &Fault,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match model.session.on_unauthorized(call.clone(), attempt) {
                RefreshDecision::Start => {
                    info!(call = call.name(), "access token rejected, refreshing");
                    Self::send(Outbound::Refresh, model, caps);
                }
                RefreshDecision::Join => {
                    debug!(call = call.name(), "waiting on outstanding refresh");
                }
                RefreshDecision::GiveUp => {
                    Self::abandon(&call, model);
                    if !model.session.is_expiring() {
                        warn!(call = call.name(), "rejected after refresh");
                        Self::session_expired(model, fault);
                    }
                }
            }
        }

        /// Applies a 2xx completion. A body that does not decode is a failure.
        fn api_succeeded(
            call: &ApiCall,
            outcome: HttpOutcome,
            model: &mut Model,
            caps: &Capabilities,
        ) -> Result<(), Fault> {
            match call {
                ApiCall::CurrentUser => {
                    let response = decode_json::<CurrentUserResponse>(outcome)?;
                    model.current_user = Some(response.data.users);
                }
                ApiCall::ListCases => {
                    let response = decode_json::<CaseListResponse>(outcome)?;
                    model.cases.replace_all(response.data);
                }
                ApiCall::ListUsers => {
                    let response = decode_json::<UserListResponse>(outcome)?;
                    model.users.replace_all(response.data.users);
                }
                ApiCall::CreateCase(draft) => {
                    expect_success(&outcome)?;
                    Self::abandon(call, model);
                    let key = accepted_key(draft)?;
                    match model.current_user_id() {
                        Some(creator) => {
                            model.cases.insert(CaseRecord::created(key, draft, creator));
                        }
                        None => Self::refresh_list::<CaseRecord>(model, caps),
                    }
                    model.show_toast("Case added", ToastKind::Success);
                }
                ApiCall::UpdateCase { case_id, draft } => {
                    expect_success(&outcome)?;
                    Self::abandon(call, model);
                    let key = accepted_key(draft)?;
                    let edited = model.cases.find(case_id).map(|r| r.edited(key, draft));
                    match edited {
                        Some(record) => {
                            model.cases.apply_edit(case_id, record);
                        }
                        None => Self::refresh_list::<CaseRecord>(model, caps),
                    }
                    model.show_toast("Case updated", ToastKind::Success);
                }
                ApiCall::DeleteCase(case_id) => {
                    expect_success(&outcome)?;
                    model.cases.remove(case_id);
                    model.show_toast("Case deleted", ToastKind::Success);
                }
                ApiCall::CreateUser(_) => {
                    expect_success(&outcome)?;
                    Self::abandon(call, model);
                    Self::refresh_list::<UserRecord>(model, caps);
                    model.show_toast("User added", ToastKind::Success);
                }
                ApiCall::DeleteUser(user_id) => {
                    expect_success(&outcome)?;
                    model.users.remove(user_id);
                    model.show_toast("User deleted", ToastKind::Success);
                }
            }
            Ok(())
        }

        /// Releases whatever a call held while outstanding.
        fn abandon(call: &ApiCall, model: &mut Model) {
            match call {
                ApiCall::ListCases => model.cases.refresh_failed(),
                ApiCall::ListUsers => model.users.refresh_failed(),
                ApiCall::CreateCase(draft) | ApiCall::UpdateCase { draft, .. } => {
                    if let Ok(key) = CaseRecord::draft_key(draft) {
                        model.cases.release(&key);
                    }
                }
                ApiCall::CreateUser(draft) => {
                    if let Ok(key) = UserRecord::draft_key(draft) {
                        model.users.release(&key);
                    }
                }
                ApiCall::DeleteCase(case_id) => model.cases.end_delete(case_id),
                ApiCall::DeleteUser(user_id) => model.users.end_delete(user_id),
                ApiCall::CurrentUser => {}
            }
        }

        fn list_action<R: Resource>(action: ListAction<R>, model: &mut Model, caps: &Capabilities) {
            debug!(resource = R::LABEL, action = action.name(), "list action");
            match action {
                ListAction::Refresh => Self::refresh_list::<R>(model, caps),
                ListAction::Add(draft) => match R::controller(model).check_add(&draft) {
                    Ok(key) => {
                        R::controller(model).reserve(key);
                        Self::dispatch(R::create_call(draft), model, caps);
                    }
                    Err(e) => model.set_error(e.into()),
                },
                ListAction::Edit { id, draft } => {
                    let checked = R::controller(model).check_edit(&id, &draft);
                    match checked {
                        Ok(key) => {
                            let Some(call) = R::update_call(id, draft) else {
                                model.set_error(AppError::new(
                                    ErrorToken::EditUnknownError,
                                    format!("{} cannot be edited", R::LABEL),
                                ));
                                return;
                            };
                            R::controller(model).reserve(key);
                            Self::dispatch(call, model, caps);
                        }
                        Err(e) => model.set_error(e.into()),
                    }
                }
                ListAction::Delete { id } => {
                    let controller = R::controller(model);
                    if controller.find(&id).is_none() {
                        model.set_error(ValidationError::MissingRecord(id.to_string()).into());
                    } else if controller.begin_delete(id.clone()) {
                        Self::dispatch(R::delete_call(id), model, caps);
                    } else {
                        debug!(resource = R::LABEL, %id, "delete already pending");
                    }
                }
                ListAction::SetFilter { field, text } => {
                    R::controller(model).set_filter(field, text);
                }
                ListAction::SetSort { field, ascending } => {
                    R::controller(model).set_sort(field, ascending);
                }
                ListAction::SetPage { page } => R::controller(model).set_page(page),
            }
        }

        fn navigate(page: Page, model: &mut Model, caps: &Capabilities) {
            match page {
                Page::Login => model.page = Page::Login,
                Page::Workspace if !model.is_authenticated() => model.page = Page::Login,
                Page::Workspace => {
                    model.page = Page::Workspace;
                    Self::refresh_list::<CaseRecord>(model, caps);
                }
                Page::AdminConsole if !model.is_admin() => {
                    model.set_error(AppError::new(
                        ErrorToken::NotAdminError,
                        "current user is not an administrator",
                    ));
                }
                Page::AdminConsole => {
                    model.page = Page::AdminConsole;
                    Self::refresh_list::<UserRecord>(model, caps);
                }
            }
        }

        /// Advances the clock. Returns true when anything visible changed.
        fn tick(now_ms: u64, model: &mut Model, caps: &Capabilities) -> bool {
            let tick = model.session.tick(now_ms);
            let mut changed = !tick.timed_out.is_empty();

            for (request_id, outbound) in tick.timed_out {
                warn!(call = outbound.name(), %request_id, "request timed out");
                Self::handle_outcome(outbound, Err(Fault::Timeout), model, caps);
            }

            if tick.redirect_due {
                info!("session expired, returning to login");
                Self::end_session(model, caps);
                changed = true;
            }

            if model
                .active_toast
                .as_mut()
                .is_some_and(|toast| toast.poll_expired(now_ms))
            {
                model.clear_toast();
                changed = true;
            }
            changed
        }
    }

    fn accepted_key(draft: &CaseDraft) -> Result<CaseId, Fault> {
        CaseRecord::draft_key(draft).map_err(|e| Fault::InvalidRequest(e.to_string()))
    }

    fn failure_token(call: &ApiCall) -> ErrorToken {
        match call {
            ApiCall::CurrentUser => ErrorToken::GetCurrentUserUnknownError,
            ApiCall::ListCases | ApiCall::ListUsers => ErrorToken::GetListUnknownError,
            ApiCall::CreateCase(_) | ApiCall::CreateUser(_) => ErrorToken::AddUnknownError,
            ApiCall::UpdateCase { .. } => ErrorToken::EditUnknownError,
            ApiCall::DeleteCase(_) | ApiCall::DeleteUser(_) => ErrorToken::DeleteUnknownError,
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            let event_name = event.name();
            debug!(event = event_name, "update");
            if event.is_user_initiated() {
                info!(event = event_name, "user_action");
            }

            let changed = match event {
                Event::Noop => false,

                Event::AppStarted => {
                    Self::load_credentials(model, caps);
                    true
                }

                Event::Configure(config) => {
                    match config.validate() {
                        Ok(base_url) => {
                            info!(backend = base_url.as_str(), "configuration applied");
                            model.base_url = Some(base_url);
                            model.config = config;
                        }
                        Err(e) => warn!(error = %e, "configuration rejected"),
                    }
                    true
                }

                Event::CredentialsLoaded(result) => {
                    let credentials = match result.map_err(KvError::from).and_then(|bytes| {
                        Self::credentials_store(model)?.decode(bytes.as_deref())
                    }) {
                        Ok(stored) => stored.unwrap_or_default(),
                        Err(e) => {
                            warn!(error = %e, "stored credentials unreadable, starting signed out");
                            Credentials::default()
                        }
                    };
                    Self::restore_session(credentials, model, caps);
                    true
                }

                Event::CredentialsStored(Ok(_)) => {
                    debug!("credentials persisted");
                    false
                }

                Event::CredentialsStored(Err(e)) => {
                    warn!(error = %e, "failed to persist credentials");
                    model.set_error(KvError::from(e).into());
                    true
                }

                Event::LoginRequested(form) => {
                    if model.login_in_flight {
                        debug!("login already in flight");
                        false
                    } else {
                        match form.validate() {
                            Ok(()) => {
                                model.login_in_flight = true;
                                model.clear_error();
                                Self::send(Outbound::Login(form), model, caps);
                            }
                            Err(e) => model.set_error(e.into()),
                        }
                        true
                    }
                }

                Event::LogoutRequested => {
                    Self::end_session(model, caps);
                    model.show_toast("Logged out", ToastKind::Info);
                    true
                }

                Event::Navigate(page) => {
                    Self::navigate(page, model, caps);
                    true
                }

                Event::Cases(action) => {
                    Self::list_action(action, model, caps);
                    true
                }

                Event::Users(action) => {
                    Self::list_action(action, model, caps);
                    true
                }

                Event::ResponseReceived {
                    request_id,
                    outcome,
                } => match model.session.complete(request_id) {
                    Some(outbound) => {
                        Self::handle_outcome(outbound, Ok(*outcome), model, caps);
                        true
                    }
                    None => {
                        debug!(%request_id, "ignoring response to abandoned request");
                        false
                    }
                },

                Event::DismissError => {
                    model.clear_error();
                    true
                }

                Event::DismissToast => {
                    model.clear_toast();
                    true
                }

                Event::TimerTick { now_ms } => Self::tick(now_ms, model, caps),
            };

            if changed {
                caps.render.render();
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let page_size = model.config.page_size;
            ViewModel {
                page: model.page,
                error: model.active_error.as_ref().map(UserFacingError::from),
                toast: model.active_toast.as_ref().map(ToastView::from),
                is_authenticated: model.is_authenticated(),
                is_ready: model.credentials_loaded,
                is_logging_in: model.login_in_flight,
                session_expiring: model.session.is_expiring(),
                current_user: model.current_user.as_ref().map(|u| CurrentUserView {
                    user_id: u.user_id,
                    username: u.username.clone(),
                    is_admin: u.is_admin,
                }),
                cases: TableView::of(&model.cases, page_size),
                users: TableView::of(&model.users, page_size),
            }
        }
    }
}
