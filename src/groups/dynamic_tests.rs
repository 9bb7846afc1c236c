use super::*;
use crate::identity::{RoleRecord, StaticDirectory, UserRecord};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Directory double that counts lookups.
#[derive(Default)]
struct CountingDirectory {
    inner: StaticDirectory,
    user_lookups: AtomicUsize,
    role_lookups: AtomicUsize,
}

impl UserDirectory for CountingDirectory {
    fn user_by_id(&self, id: u64) -> Option<UserRecord> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.user_by_id(id)
    }

    fn roles(&self) -> Vec<RoleRecord> {
        self.inner.roles()
    }

    fn role_label(&self, slug: &str) -> Option<String> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.role_label(slug)
    }
}

fn directory() -> Arc<CountingDirectory> {
    let dir = CountingDirectory::default();
    dir.inner.insert_user(UserRecord {
        id: 1,
        login: "userLogin".into(),
        display_name: "displayName".into(),
        roles: vec!["administrator".into()],
    });
    dir.inner.insert_role("administrator", "Admin");
    Arc::new(dir)
}

#[test]
fn parse_accepts_known_kinds_and_rejects_others() {
    let dir = directory();
    let g = DynamicGroup::parse("user", "id", dir.clone()).unwrap();
    assert_eq!(g.kind(), DynamicGroupType::User);
    assert_eq!(g.raw_id(), "id");

    let g = DynamicGroup::parse("role", "id", dir.clone()).unwrap();
    assert_eq!(g.kind(), DynamicGroupType::Role);

    let g = DynamicGroup::parse("not_logged_in", "0", dir.clone()).unwrap();
    assert_eq!(g.kind(), DynamicGroupType::NotLoggedIn);

    for bad in ["someThing", "", "ROLE", "role|"] {
        match DynamicGroup::parse(bad, "id", dir.clone()) {
            Err(GroupError::InvalidGroupType(k)) => assert_eq!(k, bad),
            other => panic!("expected InvalidGroupType for {bad:?}, got {other:?}"),
        }
    }
}

#[test]
fn composite_id_is_kind_pipe_raw_and_stable() {
    let dir = directory();
    let g = DynamicGroup::role("id", dir.clone());
    assert_eq!(g.id(), "role|id");
    assert_eq!(g.id(), g.id());
    assert_eq!(DynamicGroup::user(12, dir.clone()).id(), "user|12");
    assert_eq!(DynamicGroup::not_logged_in(dir).id(), "not_logged_in|0");
}

#[test]
fn from_id_round_trips_and_rejects_garbage() {
    let dir = directory();
    let g = DynamicGroup::from_id("role|editor", dir.clone()).unwrap();
    assert_eq!(g.kind(), DynamicGroupType::Role);
    assert_eq!(g.raw_id(), "editor");
    assert!(matches!(DynamicGroup::from_id("editor", dir.clone()), Err(GroupError::MalformedId(_))));
    assert!(matches!(DynamicGroup::from_id("team|editor", dir), Err(GroupError::InvalidGroupType(_))));
}

#[test]
fn user_zero_is_not_logged_in_without_lookup() {
    let dir = directory();
    let g = DynamicGroup::user(0, dir.clone());
    assert_eq!(g.name().unwrap(), NOT_LOGGED_IN_LABEL);
    assert_eq!(dir.user_lookups.load(Ordering::SeqCst), 0);

    let g = DynamicGroup::not_logged_in(dir.clone());
    assert_eq!(g.name().unwrap(), NOT_LOGGED_IN_LABEL);
}

#[test]
fn user_name_is_display_and_login() {
    let dir = directory();
    let g = DynamicGroup::user(1, dir.clone());
    assert_eq!(g.name().unwrap(), "displayName (userLogin)");
}

#[test]
fn missing_user_fails_with_entity_not_found() {
    let dir = directory();
    let g = DynamicGroup::user(99, dir.clone());
    match g.name() {
        Err(GroupError::EntityNotFound { kind, raw_id }) => {
            assert_eq!(kind, "user");
            assert_eq!(raw_id, "99");
        }
        other => panic!("expected EntityNotFound, got {other:?}"),
    }
    // Non-numeric user ids cannot name anyone either.
    assert!(DynamicGroup::new(DynamicGroupType::User, "abc", dir).name().is_err());
}

#[test]
fn role_names_fall_back_to_slug() {
    let dir = directory();
    assert_eq!(DynamicGroup::role("administrator", dir.clone()).name().unwrap(), "Admin");
    assert_eq!(DynamicGroup::role("roleId", dir).name().unwrap(), "roleId");
}

#[test]
fn name_is_cached_until_reset() {
    let dir = directory();
    let mut g = DynamicGroup::user(1, dir.clone());
    let first = g.name().unwrap().to_string();
    let second = g.name().unwrap().to_string();
    assert_eq!(first, second);
    assert_eq!(dir.user_lookups.load(Ordering::SeqCst), 1);

    dir.inner.insert_user(UserRecord { id: 1, login: "renamed".into(), display_name: "New".into(), roles: vec![] });
    assert_eq!(g.name().unwrap(), "displayName (userLogin)");
    g.reset_name();
    assert_eq!(g.name().unwrap(), "New (renamed)");
    assert_eq!(dir.user_lookups.load(Ordering::SeqCst), 2);

    let role = DynamicGroup::role("administrator", dir.clone());
    let _ = role.name().unwrap();
    let _ = role.name().unwrap();
    assert_eq!(dir.role_lookups.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_lookup_is_not_cached() {
    let dir = directory();
    let g = DynamicGroup::user(5, dir.clone());
    assert!(g.name().is_err());
    dir.inner.insert_user(UserRecord { id: 5, login: "late".into(), display_name: "Late".into(), roles: vec![] });
    assert_eq!(g.name().unwrap(), "Late (late)");
}

#[test]
fn concurrent_name_reads_share_one_lookup() {
    let dir = directory();
    let g = Arc::new(DynamicGroup::user(1, dir.clone()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let g = g.clone();
            std::thread::spawn(move || g.name().unwrap().to_string())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), "displayName (userLogin)");
    }
    assert_eq!(dir.user_lookups.load(Ordering::SeqCst), 1);
}
