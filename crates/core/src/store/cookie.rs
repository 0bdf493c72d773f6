use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::{KeyValueStore, StoreOp};
use crate::CoreResult;
use crate::clock::{Clock, SystemClock};

/// Cross-site sending policy of a cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

/// Attributes applied to cookies written through a [`CookieStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub ttl: Duration,
    pub path: String,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            path: "/".to_string(),
            secure: true,
            same_site: SameSite::Strict,
        }
    }
}

impl SameSite {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Clone)]
struct Cookie {
    value: String,
    expires_at: i64,
    secure: bool,
    same_site: SameSite,
}

/// Shared cookie storage, keyed by `(name, path)`.
///
/// Several [`CookieStore`] views may share one jar; each sees the cookies
/// whose path matches its scope.
#[derive(Debug)]
pub struct CookieJar {
    cookies: RwLock<HashMap<(String, String), Cookie>>,
    clock: Arc<dyn Clock>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            cookies: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn purge_expired(cookies: &mut HashMap<(String, String), Cookie>, now: i64) {
        cookies.retain(|_, cookie| cookie.expires_at > now);
    }
}

/// RFC 6265 path-match: `scope` is within `cookie_path`
fn path_matches(scope: &str, cookie_path: &str) -> bool {
    if scope == cookie_path {
        return true;
    }
    scope.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || scope[cookie_path.len()..].starts_with('/'))
}

/// Expiring, path-scoped view over a [`CookieJar`]
#[derive(Debug, Clone)]
pub struct CookieStore {
    jar: Arc<CookieJar>,
    scope: String,
    options: CookieOptions,
}

impl CookieStore {
    /// View of `jar` as seen from request path `scope`
    pub fn new(jar: Arc<CookieJar>, scope: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            jar,
            scope: scope.into(),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// `Set-Cookie` rendering of the entry this view would read for `key`
    #[must_use]
    pub fn header(&self, key: &str) -> Option<String> {
        let now = self.jar.clock.now();
        let cookies = self.jar.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let ((name, path), cookie) = cookies
            .iter()
            .filter(|((name, path), cookie)| {
                name == key && cookie.expires_at > now && path_matches(&self.scope, path)
            })
            .max_by_key(|((_, path), _)| path.len())?;

        let mut header = format!(
            "{name}={}; Path={path}; Max-Age={}",
            cookie.value,
            cookie.expires_at - now
        );
        if cookie.secure {
            header.push_str("; Secure");
        }
        header.push_str("; SameSite=");
        header.push_str(cookie.same_site.as_str());
        Some(header)
    }

    fn expiry(&self) -> i64 {
        let ttl = i64::try_from(self.options.ttl.as_secs()).unwrap_or(i64::MAX);
        self.jar.clock.now().saturating_add(ttl)
    }

    fn write(&self, cookies: &mut HashMap<(String, String), Cookie>, key: &str, value: &str) {
        cookies.insert(
            (key.to_string(), self.options.path.clone()),
            Cookie {
                value: value.to_string(),
                expires_at: self.expiry(),
                secure: self.options.secure,
                same_site: self.options.same_site,
            },
        );
    }
}

impl KeyValueStore for CookieStore {
    fn get(&self, key: &str) -> Option<String> {
        let now = self.jar.clock.now();
        let cookies = self.jar.cookies.read().unwrap_or_else(PoisonError::into_inner);
        // The most specific path wins, as in a browser's cookie header order
        cookies
            .iter()
            .filter(|((name, path), cookie)| {
                name == key && cookie.expires_at > now && path_matches(&self.scope, path)
            })
            .max_by_key(|((_, path), _)| path.len())
            .map(|(_, cookie)| cookie.value.clone())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut cookies = self.jar.cookies.write().unwrap_or_else(PoisonError::into_inner);
        self.write(&mut cookies, key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.jar
            .cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(key.to_string(), self.options.path.clone()));
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        let now = self.jar.clock.now();
        let mut cookies = self.jar.cookies.write().unwrap_or_else(PoisonError::into_inner);
        CookieJar::purge_expired(&mut cookies, now);
        cookies.retain(|(_, path), _| !path_matches(&self.scope, path));
        Ok(())
    }

    fn count(&self) -> usize {
        let now = self.jar.clock.now();
        self.jar
            .cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((_, path), cookie)| {
                cookie.expires_at > now && path_matches(&self.scope, path)
            })
            .count()
    }

    fn apply(&self, ops: &[StoreOp<'_>]) -> CoreResult<()> {
        let mut cookies = self.jar.cookies.write().unwrap_or_else(PoisonError::into_inner);
        for op in ops {
            match *op {
                StoreOp::Set(key, value) => self.write(&mut cookies, key, value),
                StoreOp::Remove(key) => {
                    cookies.remove(&(key.to_string(), self.options.path.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Debug, Default)]
    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn cookie_store_conformance() {
        let store = CookieStore::new(Arc::new(CookieJar::new()), "/", CookieOptions::default());
        super::super::conformance::run_all(&store);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::default());
        let jar = Arc::new(CookieJar::with_clock(clock.clone()));
        let store = CookieStore::new(
            jar,
            "/",
            CookieOptions {
                ttl: Duration::from_secs(60),
                ..CookieOptions::default()
            },
        );

        store.set("access_token", "abc").unwrap();
        clock.advance(59);
        assert_eq!(store.get("access_token").as_deref(), Some("abc"));
        clock.advance(1);
        assert_eq!(store.get("access_token"), None);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn default_ttl_is_seven_days() {
        assert_eq!(CookieOptions::default().ttl, Duration::from_secs(604_800));
    }

    #[test]
    fn header_carries_attributes() {
        let clock = Arc::new(ManualClock::default());
        let store = CookieStore::new(
            Arc::new(CookieJar::with_clock(clock.clone())),
            "/",
            CookieOptions::default(),
        );
        store.set("device_id", "d-1").unwrap();
        clock.advance(4);

        assert_eq!(
            store.header("device_id").as_deref(),
            Some("device_id=d-1; Path=/; Max-Age=604796; Secure; SameSite=Strict")
        );
        assert_eq!(store.header("missing"), None);
    }

    #[test]
    fn path_scope_controls_visibility() {
        let jar = Arc::new(CookieJar::new());
        let admin = CookieStore::new(
            jar.clone(),
            "/admin",
            CookieOptions {
                path: "/admin".into(),
                ..CookieOptions::default()
            },
        );
        let root = CookieStore::new(jar.clone(), "/", CookieOptions::default());

        admin.set("rol", "Admin").unwrap();
        root.set("rol", "User").unwrap();

        assert_eq!(admin.get("rol").as_deref(), Some("Admin"));
        assert_eq!(root.get("rol").as_deref(), Some("User"));
        assert_eq!(admin.count(), 2);
        assert_eq!(root.count(), 1);

        assert!(path_matches("/admin/users", "/admin"));
        assert!(!path_matches("/administrator", "/admin"));
    }

    #[test]
    fn clear_removes_entries_written_by_other_views() {
        let jar = Arc::new(CookieJar::new());
        let writer = CookieStore::new(
            jar.clone(),
            "/app",
            CookieOptions {
                path: "/app".into(),
                ..CookieOptions::default()
            },
        );
        let other = CookieStore::new(jar.clone(), "/app", CookieOptions::default());
        let unrelated = CookieStore::new(
            jar.clone(),
            "/docs",
            CookieOptions {
                path: "/docs".into(),
                ..CookieOptions::default()
            },
        );

        writer.set("access_token", "a").unwrap();
        other.set("refresh_token", "r").unwrap();
        unrelated.set("theme", "dark").unwrap();

        other.clear().unwrap();

        assert_eq!(other.count(), 0);
        assert_eq!(writer.get("access_token"), None);
        assert_eq!(unrelated.get("theme").as_deref(), Some("dark"));
    }
}
