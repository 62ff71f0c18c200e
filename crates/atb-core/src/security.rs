use std::{
    collections::HashMap,
    future::Future,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{ChatId, Invocation, MemberRole, UserId},
    Result,
};

// ============== Access Control ==============

/// A single access predicate attached to a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessCheck {
    OwnerOnly,
    GroupOnly,
    AdminOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    NotOwner,
    NotGroup,
    NotAdmin,
    AdminLookupFailed,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::NotOwner => "❌ This command is only available to the bot owner.",
            Rejection::NotGroup => "❌ This command can only be used in groups.",
            Rejection::NotAdmin => "❌ This command is only available to group administrators.",
            Rejection::AdminLookupFailed => "❌ Could not verify admin status.",
        }
    }
}

/// Live chat-membership lookup, implemented by the platform adapter.
#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberRole>;
}

/// Owner and sudo identities the checks are evaluated against.
#[derive(Clone, Debug)]
pub struct AccessPolicy {
    owner: UserId,
    sudo: Vec<UserId>,
}

impl AccessPolicy {
    pub fn new(owner: UserId, sudo: Vec<UserId>) -> Self {
        Self { owner, sudo }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.owner_id, cfg.sudo_users.clone())
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        user_id == self.owner
    }

    pub fn is_sudo(&self, user_id: UserId) -> bool {
        self.is_owner(user_id) || self.sudo.contains(&user_id)
    }

    /// Evaluate one check. Only `AdminOnly` touches `roles`, and only for
    /// callers outside the owner/sudo set.
    pub async fn check(
        &self,
        check: AccessCheck,
        inv: &Invocation,
        roles: &dyn RoleLookup,
    ) -> std::result::Result<(), Rejection> {
        match check {
            AccessCheck::OwnerOnly if !self.is_owner(inv.user_id) => Err(Rejection::NotOwner),
            AccessCheck::GroupOnly if inv.chat_kind.is_private() => Err(Rejection::NotGroup),
            AccessCheck::AdminOnly if !self.is_sudo(inv.user_id) => {
                match roles.member_role(inv.chat_id, inv.user_id).await {
                    Ok(role) if role.is_admin() => Ok(()),
                    Ok(_) => Err(Rejection::NotAdmin),
                    Err(e) => {
                        tracing::warn!(
                            chat_id = inv.chat_id.0,
                            user_id = inv.user_id.0,
                            "admin lookup failed: {e}"
                        );
                        Err(Rejection::AdminLookupFailed)
                    }
                }
            }
            _ => Ok(()),
        }
    }

    /// Evaluate checks in order; the first failure wins.
    pub async fn evaluate(
        &self,
        checks: &[AccessCheck],
        inv: &Invocation,
        roles: &dyn RoleLookup,
    ) -> std::result::Result<(), Rejection> {
        for check in checks {
            self.check(*check, inv, roles).await?;
        }
        Ok(())
    }
}

/// The composed checks wrapping one handler body.
#[derive(Clone, Copy, Debug)]
pub struct Gate<'a> {
    checks: &'a [AccessCheck],
}

impl<'a> Gate<'a> {
    pub fn new(checks: &'a [AccessCheck]) -> Self {
        Self { checks }
    }

    /// Run `body` only if every check passes.
    pub async fn run<F, Fut, T>(
        &self,
        policy: &AccessPolicy,
        inv: &Invocation,
        roles: &dyn RoleLookup,
        body: F,
    ) -> std::result::Result<T, Rejection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        policy.evaluate(self.checks, inv, roles).await?;
        Ok(body().await)
    }
}

// ============== Command Cooldown ==============

const COOLDOWN_SOFT_CAP: usize = 1024;

/// Per-user minimum interval between invocations of one command.
#[derive(Debug)]
pub struct CommandCooldown {
    window: Duration,
    last: Mutex<HashMap<UserId, Instant>>,
}

impl CommandCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allow(&self, user_id: UserId) -> std::result::Result<(), Duration> {
        self.allow_at(user_id, Instant::now())
    }

    /// Check and record atomically. `Err` carries the remaining wait.
    pub fn allow_at(&self, user_id: UserId, now: Instant) -> std::result::Result<(), Duration> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(prev) = last.get(&user_id) {
            let elapsed = now.saturating_duration_since(*prev);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }

        if last.len() >= COOLDOWN_SOFT_CAP {
            let window = self.window;
            last.retain(|_, at| now.saturating_duration_since(*at) < window);
        }
        last.insert(user_id, now);
        Ok(())
    }

    pub fn tracked(&self) -> usize {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Whole seconds, rounded up, never below 1.
pub fn wait_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

pub fn cooldown_message(remaining: Duration) -> String {
    format!(
        "⏳ Please wait {} seconds before using this command again.",
        wait_secs(remaining)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{domain::ChatKind, errors::Error};

    struct FixedRole(Option<MemberRole>, AtomicUsize);

    impl FixedRole {
        fn new(role: Option<MemberRole>) -> Self {
            Self(role, AtomicUsize::new(0))
        }

        fn calls(&self) -> usize {
            self.1.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoleLookup for FixedRole {
        async fn member_role(&self, _chat_id: ChatId, _user_id: UserId) -> Result<MemberRole> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0
                .ok_or_else(|| Error::External("chat member lookup failed".to_string()))
        }
    }

    fn policy() -> AccessPolicy {
        AccessPolicy::new(UserId(1), vec![UserId(2)])
    }

    fn inv(user: i64, kind: ChatKind) -> Invocation {
        Invocation {
            user_id: UserId(user),
            chat_id: ChatId(-100),
            chat_kind: kind,
        }
    }

    #[tokio::test]
    async fn owner_passes_admin_check_without_lookup() {
        let roles = FixedRole::new(None);
        let r = policy()
            .check(AccessCheck::AdminOnly, &inv(1, ChatKind::Supergroup), &roles)
            .await;
        assert_eq!(r, Ok(()));
        assert_eq!(roles.calls(), 0);
    }

    #[tokio::test]
    async fn group_only_depends_on_chat_kind_only() {
        let roles = FixedRole::new(None);
        let p = policy();
        for user in [1, 2, 99] {
            assert_eq!(
                p.check(AccessCheck::GroupOnly, &inv(user, ChatKind::Private), &roles)
                    .await,
                Err(Rejection::NotGroup)
            );
            for kind in [ChatKind::Group, ChatKind::Supergroup] {
                assert_eq!(
                    p.check(AccessCheck::GroupOnly, &inv(user, kind), &roles).await,
                    Ok(())
                );
            }
        }
    }

    #[tokio::test]
    async fn admin_check_uses_live_role_and_fails_closed() {
        let p = policy();
        let i = inv(50, ChatKind::Group);

        let admin = FixedRole::new(Some(MemberRole::Administrator));
        assert_eq!(p.check(AccessCheck::AdminOnly, &i, &admin).await, Ok(()));

        let member = FixedRole::new(Some(MemberRole::Member));
        assert_eq!(
            p.check(AccessCheck::AdminOnly, &i, &member).await,
            Err(Rejection::NotAdmin)
        );

        let broken = FixedRole::new(None);
        assert_eq!(
            p.check(AccessCheck::AdminOnly, &i, &broken).await,
            Err(Rejection::AdminLookupFailed)
        );
    }

    #[tokio::test]
    async fn sudo_is_not_owner() {
        let roles = FixedRole::new(None);
        let p = policy();
        let i = inv(2, ChatKind::Private);
        // Sudo users skip the role lookup, so a failing lookup still passes.
        assert_eq!(p.check(AccessCheck::AdminOnly, &i, &roles).await, Ok(()));
        assert_eq!(
            p.check(AccessCheck::OwnerOnly, &i, &roles).await,
            Err(Rejection::NotOwner)
        );
    }

    #[tokio::test]
    async fn gate_skips_body_on_rejection() {
        let roles = FixedRole::new(Some(MemberRole::Member));
        let p = policy();
        let ran = &AtomicUsize::new(0);
        let checks = [AccessCheck::OwnerOnly];
        let gate = Gate::new(&checks);

        let r = gate
            .run(&p, &inv(7, ChatKind::Private), &roles, move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(r, Err(Rejection::NotOwner));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(
            Rejection::NotOwner.message(),
            "❌ This command is only available to the bot owner."
        );

        let r = gate
            .run(&p, &inv(1, ChatKind::Private), &roles, move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
                "done"
            })
            .await;
        assert_eq!(r, Ok("done"));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_failing_check_short_circuits() {
        let roles = FixedRole::new(Some(MemberRole::Member));
        let p = policy();
        let r = p
            .evaluate(
                &[AccessCheck::GroupOnly, AccessCheck::AdminOnly],
                &inv(50, ChatKind::Private),
                &roles,
            )
            .await;
        assert_eq!(r, Err(Rejection::NotGroup));
        assert_eq!(roles.calls(), 0);
    }

    #[test]
    fn cooldown_rejects_inside_window() {
        let start = Instant::now();
        let cd = CommandCooldown::new(Duration::from_secs(3));
        let u = UserId(1);

        assert!(cd.allow_at(u, start).is_ok());
        let wait = cd
            .allow_at(u, start + Duration::from_millis(500))
            .unwrap_err();
        assert!(wait <= Duration::from_secs(3));
        assert_eq!(wait_secs(wait), 3);

        // Other users are independent.
        assert!(cd.allow_at(UserId(2), start).is_ok());

        assert!(cd.allow_at(u, start + Duration::from_secs(3)).is_ok());
    }

    #[test]
    fn cooldown_prunes_expired_entries_past_soft_cap() {
        let start = Instant::now();
        let cd = CommandCooldown::new(Duration::from_secs(1));
        for id in 0..COOLDOWN_SOFT_CAP as i64 {
            assert!(cd.allow_at(UserId(id), start).is_ok());
        }
        assert_eq!(cd.tracked(), COOLDOWN_SOFT_CAP);

        assert!(cd
            .allow_at(UserId(-1), start + Duration::from_secs(2))
            .is_ok());
        assert_eq!(cd.tracked(), 1);
    }

    #[test]
    fn wait_is_rounded_up() {
        assert_eq!(wait_secs(Duration::from_millis(1)), 1);
        assert_eq!(wait_secs(Duration::from_millis(4001)), 5);
        assert_eq!(wait_secs(Duration::from_secs(2)), 2);
        assert_eq!(
            cooldown_message(Duration::from_millis(2500)),
            "⏳ Please wait 3 seconds before using this command again."
        );
    }
}
