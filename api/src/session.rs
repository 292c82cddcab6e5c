use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fmt};

/// Username and password used to (re-)open a session.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// The account (member) all requests are made on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberResponse {
    pub member: Member,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Member {
    pub id: MemberId,
}

/// State of the one authenticated conversation a client holds with the API.
///
/// Cookies live in the HTTP client's cookie store; the token returned by `/auth` is kept here and
/// replaced on every re-authentication. The member id is resolved at most once.
#[derive(Debug)]
pub(crate) struct Session {
    credentials: Credentials,
    token: RefCell<Option<String>>,
    member_id: OnceCell<MemberId>,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token: RefCell::new(None),
            member_id: OnceCell::new(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn renew(&self, token: Option<String>) {
        *self.token.borrow_mut() = token;
    }

    pub fn member_id(&self) -> &OnceCell<MemberId> {
        &self.member_id
    }
}
