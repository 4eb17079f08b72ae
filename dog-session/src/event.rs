//! Inbound session payloads and the lifecycle events built from them.
//!
//! [`SessionPayload`] is the loose shape the auth layer hands over after it
//! has verified a signed session. The same shape carries different fields
//! depending on the lifecycle moment, so [`SessionEvent::from_payload`]
//! validates it into one explicit variant before it reaches reconciliation.

use std::fmt;
use std::str::FromStr;

use dog_core::{TenantContext, TenantId};
use serde::{Deserialize, Serialize};

use crate::models::{User, UserId};
use crate::{SessionError, SessionResult};

/// The `user` object of a session payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Option<UserId>,
    pub email: Option<String>,
    pub username: Option<String>,
}

/// The `owner` object of a session payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOwner {
    pub id: Option<UserId>,
    pub email: Option<String>,
}

/// A verified session payload as received from the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// `stores/{store_hash}` style path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Same format as `context`; carried instead of it by some payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<SessionOwner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
    /// Bare store hash, sent by uninstall payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_hash: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl SessionPayload {
    pub fn access_token(&self) -> Option<&str> {
        non_empty(self.access_token.as_ref())
    }

    pub fn scope(&self) -> Option<&str> {
        non_empty(self.scope.as_ref())
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user
            .as_ref()
            .and_then(|u| u.id.as_ref())
            .filter(|id| !id.is_empty())
    }

    pub fn owner_id(&self) -> Option<&UserId> {
        self.owner.as_ref().and_then(|o| o.id.as_ref())
    }

    /// Tenant from `context`, falling back to `sub`.
    pub fn tenant(&self) -> TenantContext {
        TenantContext::resolve(self.context.as_deref(), self.sub.as_deref())
    }

    /// Tenant from `context` alone. Grants are only ever written for the
    /// store named in `context`.
    pub fn grant_tenant(&self) -> TenantContext {
        TenantContext::resolve(self.context.as_deref(), None)
    }

    /// Tenant from the bare `store_hash` field.
    pub fn uninstall_tenant(&self) -> TenantContext {
        TenantContext::from_store_hash(self.store_hash.as_deref())
    }

    /// The global user record this payload describes, if it names a user.
    ///
    /// A payload user without an email is stored with an empty one.
    pub fn user_record(&self) -> Option<User> {
        let user = self.user.as_ref()?;
        let user_id = user.id.clone().filter(|id| !id.is_empty())?;
        Some(User {
            user_id,
            email: user.email.clone().unwrap_or_default(),
            username: user.username.clone(),
        })
    }

    fn require_user(&self, kind: LifecycleKind) -> SessionResult<User> {
        let user = self
            .user
            .as_ref()
            .ok_or_else(|| SessionError::missing_field(kind.as_str(), "user"))?;
        let user_id = user
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::missing_field(kind.as_str(), "user.id"))?;
        let email = user
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SessionError::missing_field(kind.as_str(), "user.email"))?;

        Ok(User {
            user_id,
            email,
            username: user.username.clone(),
        })
    }

    fn require_tenant(&self, kind: LifecycleKind) -> SessionResult<TenantId> {
        let tenant = self.tenant();
        if !tenant.is_resolved() {
            return Err(SessionError::missing_field(kind.as_str(), "context"));
        }
        Ok(tenant.tenant_id)
    }
}

/// The lifecycle moment a payload was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Install,
    Update,
    Load,
    AddUser,
    RemoveUser,
    Uninstall,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::Install => "install",
            LifecycleKind::Update => "update",
            LifecycleKind::Load => "load",
            LifecycleKind::AddUser => "add_user",
            LifecycleKind::RemoveUser => "remove_user",
            LifecycleKind::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(LifecycleKind::Install),
            "update" => Ok(LifecycleKind::Update),
            "load" => Ok(LifecycleKind::Load),
            "add_user" => Ok(LifecycleKind::AddUser),
            "remove_user" => Ok(LifecycleKind::RemoveUser),
            "uninstall" => Ok(LifecycleKind::Uninstall),
            other => Err(SessionError::invalid_event(format!(
                "unknown lifecycle kind `{other}`"
            ))),
        }
    }
}

/// App installed or re-authorized: the acting user is the store owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEvent {
    pub store_hash: TenantId,
    pub access_token: String,
    pub scope: String,
    pub user: User,
    pub owner: Option<UserId>,
}

/// App opened by a user, possibly one the owner invited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUserEvent {
    pub store_hash: TenantId,
    pub user: User,
    pub owner: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveUserEvent {
    pub store_hash: TenantId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallEvent {
    pub store_hash: TenantId,
    pub user_id: Option<UserId>,
}

/// A validated lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Install(InstallEvent),
    Update(InstallEvent),
    Load(AddUserEvent),
    AddUser(AddUserEvent),
    RemoveUser(RemoveUserEvent),
    Uninstall(UninstallEvent),
}

impl SessionEvent {
    /// Validate `payload` as an event of `kind`.
    ///
    /// Install and update need a token, a scope, a resolvable store and a
    /// user with id and email. Load and add-user need the store and user.
    /// Remove-user needs the store and a user id. Uninstall takes the store
    /// from `store_hash`, then from `context`/`sub`.
    pub fn from_payload(kind: LifecycleKind, payload: &SessionPayload) -> SessionResult<Self> {
        match kind {
            LifecycleKind::Install | LifecycleKind::Update => {
                let access_token = payload
                    .access_token()
                    .ok_or_else(|| SessionError::missing_field(kind.as_str(), "access_token"))?
                    .to_string();
                let scope = payload
                    .scope()
                    .ok_or_else(|| SessionError::missing_field(kind.as_str(), "scope"))?
                    .to_string();
                let event = InstallEvent {
                    store_hash: payload.require_tenant(kind)?,
                    access_token,
                    scope,
                    user: payload.require_user(kind)?,
                    owner: payload.owner_id().cloned(),
                };
                Ok(if kind == LifecycleKind::Install {
                    SessionEvent::Install(event)
                } else {
                    SessionEvent::Update(event)
                })
            }
            LifecycleKind::Load | LifecycleKind::AddUser => {
                let event = AddUserEvent {
                    store_hash: payload.require_tenant(kind)?,
                    user: payload.require_user(kind)?,
                    owner: payload.owner_id().cloned(),
                };
                Ok(if kind == LifecycleKind::Load {
                    SessionEvent::Load(event)
                } else {
                    SessionEvent::AddUser(event)
                })
            }
            LifecycleKind::RemoveUser => Ok(SessionEvent::RemoveUser(RemoveUserEvent {
                store_hash: payload.require_tenant(kind)?,
                user_id: payload
                    .user_id()
                    .cloned()
                    .ok_or_else(|| SessionError::missing_field(kind.as_str(), "user.id"))?,
            })),
            LifecycleKind::Uninstall => {
                let tenant = Some(payload.uninstall_tenant())
                    .filter(TenantContext::is_resolved)
                    .unwrap_or_else(|| payload.tenant());
                if !tenant.is_resolved() {
                    return Err(SessionError::missing_field(kind.as_str(), "store_hash"));
                }
                Ok(SessionEvent::Uninstall(UninstallEvent {
                    store_hash: tenant.tenant_id,
                    user_id: payload.user_id().cloned(),
                }))
            }
        }
    }

    pub fn kind(&self) -> LifecycleKind {
        match self {
            SessionEvent::Install(_) => LifecycleKind::Install,
            SessionEvent::Update(_) => LifecycleKind::Update,
            SessionEvent::Load(_) => LifecycleKind::Load,
            SessionEvent::AddUser(_) => LifecycleKind::AddUser,
            SessionEvent::RemoveUser(_) => LifecycleKind::RemoveUser,
            SessionEvent::Uninstall(_) => LifecycleKind::Uninstall,
        }
    }

    pub fn store_hash(&self) -> &TenantId {
        match self {
            SessionEvent::Install(e) | SessionEvent::Update(e) => &e.store_hash,
            SessionEvent::Load(e) | SessionEvent::AddUser(e) => &e.store_hash,
            SessionEvent::RemoveUser(e) => &e.store_hash,
            SessionEvent::Uninstall(e) => &e.store_hash,
        }
    }
}
