//! Credential pair and the bookkeeping around authenticated calls.
//!
//! Every backend call is described as data ([`Outbound`]) so it can be
//! re-issued after a token refresh. A call is refreshed for at most once:
//! the re-issued call carries [`Attempt::Retry`] and a second 401 ends the
//! session instead of refreshing again. Calls that hit a 401 while a
//! refresh is already outstanding wait for that refresh.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::capabilities::{AuthScheme, Endpoint};
use crate::event::{CaseDraft, CaseId, LoginForm, Secret, UserDraft, UserId};

/// Correlates a completion (or timeout) with the call that was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persisted token pair. Absent fields load as empty tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "JWTAccessToken", default)]
    access_token: Secret,
    #[serde(rename = "JWTRefreshToken", default)]
    refresh_token: Secret,
}

impl Credentials {
    pub fn new(access_token: Secret, refresh_token: Secret) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub fn access_token(&self) -> &Secret {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &Secret {
        &self.refresh_token
    }

    /// True when there is no access token to resume a session with.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    pub fn bearer(&self, auth: AuthScheme) -> Option<String> {
        match auth {
            AuthScheme::Anonymous => None,
            AuthScheme::AccessToken => Some(format!("Bearer {}", self.access_token.expose())),
            AuthScheme::RefreshToken => Some(format!("Bearer {}", self.refresh_token.expose())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

/// An authenticated backend operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    CurrentUser,
    ListCases,
    CreateCase(CaseDraft),
    UpdateCase { case_id: CaseId, draft: CaseDraft },
    DeleteCase(CaseId),
    ListUsers,
    CreateUser(UserDraft),
    DeleteUser(UserId),
}

impl ApiCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ApiCall::CurrentUser => Endpoint::current_user(),
            ApiCall::ListCases => Endpoint::list_cases(),
            ApiCall::CreateCase(_) => Endpoint::create_case(),
            ApiCall::UpdateCase { case_id, .. } => Endpoint::update_case(case_id),
            ApiCall::DeleteCase(case_id) => Endpoint::delete_case(case_id),
            ApiCall::ListUsers => Endpoint::list_users(),
            ApiCall::CreateUser(_) => Endpoint::create_user(),
            ApiCall::DeleteUser(user_id) => Endpoint::delete_user(*user_id),
        }
    }

    pub fn payload(&self) -> Option<Payload<'_>> {
        match self {
            ApiCall::CreateCase(draft) | ApiCall::UpdateCase { draft, .. } => {
                Some(Payload::Case(draft))
            }
            ApiCall::CreateUser(draft) => Some(Payload::User(draft)),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            ApiCall::CurrentUser => "current_user",
            ApiCall::ListCases => "list_cases",
            ApiCall::CreateCase(_) => "create_case",
            ApiCall::UpdateCase { .. } => "update_case",
            ApiCall::DeleteCase(_) => "delete_case",
            ApiCall::ListUsers => "list_users",
            ApiCall::CreateUser(_) => "create_user",
            ApiCall::DeleteUser(_) => "delete_user",
        }
    }
}

/// JSON request body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Payload<'a> {
    Login(&'a LoginForm),
    Case(&'a CaseDraft),
    User(&'a UserDraft),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Login(LoginForm),
    Refresh,
    Api { call: ApiCall, attempt: Attempt },
}

impl Outbound {
    pub fn first(call: ApiCall) -> Self {
        Self::Api {
            call,
            attempt: Attempt::First,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Outbound::Login(_) => Endpoint::login(),
            Outbound::Refresh => Endpoint::refresh(),
            Outbound::Api { call, .. } => call.endpoint(),
        }
    }

    pub fn payload(&self) -> Option<Payload<'_>> {
        match self {
            Outbound::Login(form) => Some(Payload::Login(form)),
            Outbound::Refresh => None,
            Outbound::Api { call, .. } => call.payload(),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Outbound::Login(_) => "login",
            Outbound::Refresh => "refresh",
            Outbound::Api { call, .. } => call.name(),
        }
    }
}

/// A point in shell time `delay_ms` after it was armed.
///
/// Armed before the shell has reported any time, the countdown starts at
/// the first tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    delay_ms: u64,
    due_at_ms: Option<u64>,
}

impl Deadline {
    pub fn after(delay_ms: u64, now_ms: Option<u64>) -> Self {
        Self {
            delay_ms,
            due_at_ms: now_ms.map(|now| now.saturating_add(delay_ms)),
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.due_at_ms {
            Some(due) => now_ms >= due,
            None => {
                self.due_at_ms = Some(now_ms.saturating_add(self.delay_ms));
                false
            }
        }
    }
}

#[derive(Clone, Debug)]
struct InFlight {
    outbound: Outbound,
    deadline: Deadline,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Send the refresh call now.
    Start,
    /// A refresh is already outstanding; the call waits for it.
    Join,
    /// The call was already retried once, or the session is ending.
    GiveUp,
}

#[derive(Debug, Default)]
pub struct Tick {
    pub timed_out: Vec<(RequestId, Outbound)>,
    pub redirect_due: bool,
}

#[derive(Debug, Default)]
pub struct Session {
    credentials: Credentials,
    refresh_in_flight: Option<RequestId>,
    parked: Vec<ApiCall>,
    in_flight: HashMap<RequestId, InFlight>,
    redirect: Option<Deadline>,
    clock_ms: Option<u64>,
}

impl Session {
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight.is_some()
    }

    pub fn is_expiring(&self) -> bool {
        self.redirect.is_some()
    }

    pub fn clock_ms(&self) -> Option<u64> {
        self.clock_ms
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Registers an outgoing call and starts its timeout.
    pub fn begin(&mut self, outbound: Outbound, timeout_ms: u64) -> RequestId {
        let id = RequestId::generate();
        if matches!(outbound, Outbound::Refresh) {
            self.refresh_in_flight = Some(id);
        }
        self.in_flight.insert(
            id,
            InFlight {
                outbound,
                deadline: Deadline::after(timeout_ms, self.clock_ms),
            },
        );
        id
    }

    /// `None` for completions of calls that already timed out.
    pub fn complete(&mut self, id: RequestId) -> Option<Outbound> {
        self.in_flight.remove(&id).map(|f| f.outbound)
    }

    pub fn on_unauthorized(&mut self, call: ApiCall, attempt: Attempt) -> RefreshDecision {
        if attempt == Attempt::Retry || self.is_expiring() {
            return RefreshDecision::GiveUp;
        }
        self.parked.push(call);
        if self.is_refreshing() {
            RefreshDecision::Join
        } else {
            RefreshDecision::Start
        }
    }

    /// Swaps in the new access token and hands back the calls to re-issue.
    pub fn on_refresh_succeeded(&mut self, access_token: Secret) -> Vec<ApiCall> {
        self.refresh_in_flight = None;
        self.credentials.access_token = access_token;
        std::mem::take(&mut self.parked)
    }

    /// Arms the redirect to the login page and hands back the calls that
    /// were waiting on the refresh.
    pub fn on_refresh_failed(&mut self, redirect_delay_ms: u64) -> Vec<ApiCall> {
        self.refresh_in_flight = None;
        if self.redirect.is_none() {
            self.redirect = Some(Deadline::after(redirect_delay_ms, self.clock_ms));
        }
        std::mem::take(&mut self.parked)
    }

    /// Advances shell time, expiring overdue calls and the redirect.
    pub fn tick(&mut self, now_ms: u64) -> Tick {
        self.clock_ms = Some(now_ms);

        let mut expired: Vec<RequestId> = self
            .in_flight
            .iter_mut()
            .filter_map(|(id, f)| f.deadline.poll(now_ms).then_some(*id))
            .collect();
        expired.sort_unstable_by_key(|id| id.0);

        let timed_out = expired
            .into_iter()
            .filter_map(|id| self.in_flight.remove(&id).map(|f| (id, f.outbound)))
            .collect();

        let redirect_due = self.redirect.as_mut().is_some_and(|d| d.poll(now_ms));
        if redirect_due {
            self.redirect = None;
        }

        Tick {
            timed_out,
            redirect_due,
        }
    }

    /// Replaces the whole session with one holding `credentials`.
    ///
    /// Everything the previous session had outstanding is dropped, including
    /// a pending refresh or redirect, and late completions are ignored.
    /// Returns the dropped API calls so their holds can be released.
    pub fn start(&mut self, credentials: Credentials) -> Vec<ApiCall> {
        let previous = std::mem::take(self);
        self.clock_ms = previous.clock_ms;
        self.credentials = credentials;

        let mut dropped: Vec<(RequestId, ApiCall)> = previous
            .in_flight
            .into_iter()
            .filter_map(|(id, f)| match f.outbound {
                Outbound::Api { call, .. } => Some((id, call)),
                Outbound::Login(_) | Outbound::Refresh => None,
            })
            .collect();
        dropped.sort_unstable_by_key(|(id, _)| id.0);
        dropped
            .into_iter()
            .map(|(_, call)| call)
            .chain(previous.parked)
            .collect()
    }

    /// Forgets the credential pair and every outstanding call.
    pub fn end(&mut self) {
        let clock_ms = self.clock_ms;
        *self = Self {
            clock_ms,
            ..Self::default()
        };
    }
}
