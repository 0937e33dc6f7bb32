//! MySQL credential store with range-partition maintenance
//!
//! Only built with the `mysql` feature. The host may be a TCP host name or,
//! when it starts with `/`, the path of a unix socket.

use super::{CredentialStore, PartitionBoundary};
use crate::config::ConnectionParams;
use crate::error::{StoreError, StoreResult};
use crate::parser::Credential;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};
use tracing::debug;

const CREATE_LEAK_TABLE: &str = "CREATE TABLE leak (\
     id INT NOT NULL AUTO_INCREMENT, \
     domain VARCHAR(255), \
     user VARCHAR(255), \
     password TEXT, \
     PRIMARY KEY (id)\
     ) DEFAULT CHARSET 'utf8mb4'";

const TABLE_EXISTS: &str = "SELECT COUNT(DISTINCT `table_name`) FROM `information_schema`.`columns` \
     WHERE `table_schema` = ? AND `table_name` = 'leak'";

const INSERT_RECORD: &str = "INSERT INTO leak (domain, user, password) VALUES (?, ?, ?)";

/// Credential store backed by a single MySQL connection
pub struct MySqlStore {
    conn: Conn,
    database: String,
    in_transaction: bool,
}

impl MySqlStore {
    /// Connect using fully resolved parameters
    pub fn connect(params: &ConnectionParams) -> StoreResult<Self> {
        let (user, password, host) = match (&params.user, &params.password, &params.host) {
            (Some(u), Some(p), Some(h)) => (u.clone(), p.clone(), h.clone()),
            _ => {
                return Err(StoreError::OpenFailed {
                    target: params.database.clone(),
                    reason: "user, password and host are required for MySQL".into(),
                })
            }
        };

        let mut opts = OptsBuilder::new()
            .user(Some(user))
            .pass(Some(password))
            .db_name(Some(params.database.clone()));

        opts = if host.starts_with('/') {
            opts.socket(Some(host))
        } else {
            opts.ip_or_hostname(Some(host))
        };

        let mut conn = Conn::new(opts).map_err(|e| StoreError::OpenFailed {
            target: params.database.clone(),
            reason: e.to_string(),
        })?;
        conn.query_drop("SET NAMES utf8mb4")?;

        Ok(Self {
            conn,
            database: params.database.clone(),
            in_transaction: false,
        })
    }
}

impl CredentialStore for MySqlStore {
    fn ensure_schema(&mut self) -> StoreResult<bool> {
        let count: Option<u64> = self.conn.exec_first(TABLE_EXISTS, (self.database.as_str(),))?;
        if count.unwrap_or(0) > 0 {
            return Ok(false);
        }
        self.conn.query_drop(CREATE_LEAK_TABLE)?;
        debug!("Created table leak in {}", self.database);
        Ok(true)
    }

    fn begin(&mut self) -> StoreResult<()> {
        if self.in_transaction {
            return Err(StoreError::Transaction("transaction already open".into()));
        }
        self.conn.query_drop("START TRANSACTION")?;
        self.in_transaction = true;
        Ok(())
    }

    fn insert(&mut self, record: &Credential<'_>) -> StoreResult<()> {
        if !self.in_transaction {
            return Err(StoreError::Transaction("insert outside transaction".into()));
        }
        self.conn
            .exec_drop(INSERT_RECORD, (record.domain, record.user, record.secret))?;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.in_transaction {
            return Err(StoreError::Transaction("no transaction to commit".into()));
        }
        self.conn.query_drop("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.conn.query_drop("ROLLBACK")?;
        Ok(())
    }

    fn supports_partitioning(&self) -> bool {
        true
    }

    fn last_insert_id(&mut self) -> StoreResult<u64> {
        let id: Option<u64> = self.conn.query_first("SELECT LAST_INSERT_ID()")?;
        Ok(id.unwrap_or(0))
    }

    fn add_partition(&mut self, boundary: &PartitionBoundary) -> StoreResult<()> {
        let sql = format!(
            "ALTER TABLE leak PARTITION BY RANGE(id) (PARTITION {} VALUES LESS THAN ({}))",
            boundary.name(),
            boundary.upper
        );
        self.conn.query_drop(sql)?;
        Ok(())
    }
}
