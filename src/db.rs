use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use reqwest::Url;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::offline::HttpResponse;
use crate::utils;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache store lock poisoned")]
    Poisoned,
}

/// Identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
    digest: String,
}

impl CacheKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let method = method.trim().to_uppercase();
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        let url = normalized.to_string();

        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b" ");
        hasher.update(url.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Self {
            method,
            url,
            digest,
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub namespace: String,
    pub method: String,
    pub url: String,
    pub response: HttpResponse,
    pub stored_at: DateTime<Utc>,
}

/// Named cache namespaces backed by SQLite.
///
/// Entries never expire on their own; a whole namespace is dropped at once.
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    pub fn open_default() -> Result<Self, CacheError> {
        let path = utils::database_path();
        utils::ensure_parent(&path);
        Self::open(path)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_names(
                name TEXT PRIMARY KEY,
                created_at_utc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cache_entries(
                cache_name TEXT NOT NULL,
                request_key TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                stored_at_utc TEXT NOT NULL,
                PRIMARY KEY (cache_name, request_key)
            );",
        )?;
        Ok(())
    }

    /// Creates the namespace if it does not exist yet.
    pub fn open_namespace(&self, name: &str) -> Result<(), CacheError> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO cache_names (name, created_at_utc) VALUES (?1, ?2)",
            params![name, Utc::now()],
        )?;
        Ok(())
    }

    pub fn has_namespace(&self, name: &str) -> Result<bool, CacheError> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM cache_names WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Namespace names in creation order.
    pub fn namespaces(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM cache_names ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Removes a namespace and everything stored in it.
    pub fn delete_namespace(&self, name: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1",
            params![name],
        )?;
        let removed = tx.execute("DELETE FROM cache_names WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn put(
        &self,
        namespace: &str,
        key: &CacheKey,
        response: &HttpResponse,
    ) -> Result<(), CacheError> {
        let headers = serde_json::to_string(&response.headers)?;
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO cache_names (name, created_at_utc) VALUES (?1, ?2)",
            params![namespace, now],
        )?;
        tx.execute(
            "INSERT INTO cache_entries
                (cache_name, request_key, method, url, status, headers, body, stored_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(cache_name, request_key) DO UPDATE SET
               status = excluded.status,
               headers = excluded.headers,
               body = excluded.body,
               stored_at_utc = excluded.stored_at_utc",
            params![
                namespace,
                key.digest(),
                key.method,
                key.url,
                response.status,
                headers,
                response.body,
                now
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn lookup(&self, namespace: &str, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT method, url, status, headers, body, stored_at_utc
                 FROM cache_entries WHERE cache_name = ?1 AND request_key = ?2",
                params![namespace, key.digest()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, DateTime<Utc>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((method, url, status, headers, body, stored_at)) = row else {
            return Ok(None);
        };
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        Ok(Some(CacheEntry {
            namespace: namespace.to_string(),
            method,
            url,
            response: HttpResponse {
                status,
                headers,
                body,
            },
            stored_at,
        }))
    }

    pub fn entry_count(&self, namespace: &str) -> Result<u64, CacheError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> CacheKey {
        CacheKey::new("GET", &Url::parse(&format!("http://localhost:3000{path}")).unwrap())
    }

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/css".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn key_ignores_fragment_and_method_case() {
        let a = CacheKey::new("get", &Url::parse("http://x.test/a?b=1#top").unwrap());
        let b = CacheKey::new("GET", &Url::parse("http://x.test/a?b=1").unwrap());
        assert_eq!(a, b);
        assert_ne!(a.digest(), key("/a").digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn put_then_lookup_in_same_namespace() {
        let store = CacheStore::open_in_memory().unwrap();
        store.put("v1", &key("/shell.css"), &response("body{}")).unwrap();

        let entry = store.lookup("v1", &key("/shell.css")).unwrap().unwrap();
        assert_eq!(entry.response.body, b"body{}".to_vec());
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.url, "http://localhost:3000/shell.css");
        assert!(store.lookup("v2", &key("/shell.css")).unwrap().is_none());
        assert!(store.has_namespace("v1").unwrap());
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let store = CacheStore::open_in_memory().unwrap();
        store.put("v1", &key("/app.js"), &response("old")).unwrap();
        store.put("v1", &key("/app.js"), &response("new")).unwrap();
        assert_eq!(store.entry_count("v1").unwrap(), 1);
        let entry = store.lookup("v1", &key("/app.js")).unwrap().unwrap();
        assert_eq!(entry.response.body, b"new".to_vec());
    }

    #[test]
    fn delete_namespace_drops_its_entries() {
        let store = CacheStore::open_in_memory().unwrap();
        store.open_namespace("v0").unwrap();
        store.put("v0", &key("/a"), &response("a")).unwrap();
        store.put("v1", &key("/a"), &response("a")).unwrap();
        assert_eq!(store.namespaces().unwrap(), vec!["v0".to_string(), "v1".to_string()]);

        assert!(store.delete_namespace("v0").unwrap());
        assert!(!store.delete_namespace("v0").unwrap());
        assert_eq!(store.namespaces().unwrap(), vec!["v1".to_string()]);
        assert_eq!(store.entry_count("v0").unwrap(), 0);
        assert_eq!(store.entry_count("v1").unwrap(), 1);
    }

    #[test]
    fn store_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        {
            let store = CacheStore::open(&path).unwrap();
            store.put("v1", &key("/index.html"), &response("<html>")).unwrap();
        }
        let store = CacheStore::open(&path).unwrap();
        assert!(store.lookup("v1", &key("/index.html")).unwrap().is_some());
    }
}
