//! Persisted resting orders.
//!
//! One row per logical resting order (market + direction). Rows are amended
//! in place on refresh and deleted once expired.

use crate::error::StoreError;
use crate::shared::{Direction, MarketId};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

/// A resting order as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOrder {
    pub order_id: i64,
    pub market_id: MarketId,
    pub direction: Direction,
    pub price: u64,
    pub timestamp: i64,
    pub expiry: i64,
    pub maker: String,
    pub token: String,
    /// Wei. The amount the order was created with, not the remainder.
    pub amount: u128,
    pub order_group: String,
    pub fill_hash: String,
}

/// Fields of a row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLiveOrder {
    pub market_id: MarketId,
    pub direction: Direction,
    pub price: u64,
    pub timestamp: i64,
    pub expiry: i64,
    pub maker: String,
    pub token: String,
    pub amount: u128,
    pub order_group: String,
    pub fill_hash: String,
}

/// Storage for resting-order rows.
pub trait OrderStore: Send + Sync {
    /// Delete rows with `expiry <= now`. Returns how many went.
    fn delete_expired(&self, now: i64) -> Result<usize, StoreError>;

    fn find(&self, market_id: &MarketId, direction: Direction) -> Result<Vec<LiveOrder>, StoreError>;

    fn count_by_market(&self, market_id: &MarketId) -> Result<u64, StoreError>;

    /// Returns the new row id.
    fn insert(&self, order: &NewLiveOrder) -> Result<i64, StoreError>;

    /// Refresh price and timing of an existing row.
    fn update(&self, order_id: i64, price: u64, timestamp: i64, expiry: i64) -> Result<(), StoreError>;
}

/// SQLite-backed [`OrderStore`].
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Open (or create) the database file and its schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS live_orders (
                order_id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id TEXT NOT NULL,
                direction INTEGER NOT NULL,
                price INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                expiry INTEGER NOT NULL,
                maker TEXT NOT NULL,
                token TEXT NOT NULL,
                amount TEXT NOT NULL,
                order_group TEXT NOT NULL,
                fill_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_live_orders_market
            ON live_orders(market_id, direction);

            CREATE INDEX IF NOT EXISTS idx_live_orders_expiry
            ON live_orders(expiry);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

type RawRow = (i64, String, i64, i64, i64, i64, String, String, String, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

impl TryFrom<RawRow> for LiveOrder {
    type Error = StoreError;

    fn try_from(raw: RawRow) -> Result<Self, Self::Error> {
        let (order_id, market_id, direction, price, timestamp, expiry, maker, token, amount, order_group, fill_hash) =
            raw;
        let corrupt = |reason: String| StoreError::CorruptRow { row_id: order_id, reason };

        let direction = u8::try_from(direction)
            .ok()
            .and_then(Direction::from_u8)
            .ok_or_else(|| corrupt(format!("direction {}", direction)))?;
        let price = u64::try_from(price).map_err(|_| corrupt(format!("price {}", price)))?;
        let amount = amount
            .parse::<u128>()
            .map_err(|_| corrupt(format!("amount {:?}", amount)))?;

        Ok(LiveOrder {
            order_id,
            market_id: MarketId::new(market_id),
            direction,
            price,
            timestamp,
            expiry,
            maker,
            token,
            amount,
            order_group,
            fill_hash,
        })
    }
}

impl OrderStore for SqliteOrderStore {
    fn delete_expired(&self, now: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM live_orders WHERE expiry <= ?1", params![now])?)
    }

    fn find(&self, market_id: &MarketId, direction: Direction) -> Result<Vec<LiveOrder>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, market_id, direction, price, timestamp, expiry,
                   maker, token, amount, order_group, fill_hash
            FROM live_orders
            WHERE market_id = ?1 AND direction = ?2
            ORDER BY order_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![market_id.as_str(), direction.as_u8()], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(LiveOrder::try_from).collect()
    }

    fn count_by_market(&self, market_id: &MarketId) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM live_orders WHERE market_id = ?1",
            params![market_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn insert(&self, order: &NewLiveOrder) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO live_orders
                (market_id, direction, price, timestamp, expiry, maker, token, amount, order_group, fill_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                order.market_id.as_str(),
                order.direction.as_u8(),
                order.price as i64,
                order.timestamp,
                order.expiry,
                order.maker,
                order.token,
                order.amount.to_string(),
                order.order_group,
                order.fill_hash,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, order_id: i64, price: u64, timestamp: i64, expiry: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE live_orders SET price = ?1, timestamp = ?2, expiry = ?3 WHERE order_id = ?4",
            params![price as i64, timestamp, expiry, order_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(market: &str, direction: Direction, expiry: i64) -> NewLiveOrder {
        NewLiveOrder {
            market_id: MarketId::new(market),
            direction,
            price: 480_000_000,
            timestamp: 100,
            expiry,
            maker: "0xmaker".into(),
            token: "0xtoken".into(),
            amount: 50_000_000_000_000_000_000,
            order_group: "0x0102030405060708090a0b0c".into(),
            fill_hash: "0xfill".into(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let store = SqliteOrderStore::new_in_memory().unwrap();
        let id = store.insert(&row("42", Direction::Buy, 500)).unwrap();

        let found = store.find(&MarketId::new("42"), Direction::Buy).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, id);
        assert_eq!(found[0].amount, 50_000_000_000_000_000_000);
        assert_eq!(found[0].direction, Direction::Buy);

        assert!(store.find(&MarketId::new("42"), Direction::Sell).unwrap().is_empty());
        assert!(store.find(&MarketId::new("43"), Direction::Buy).unwrap().is_empty());
    }

    #[test]
    fn test_count_by_market() {
        let store = SqliteOrderStore::new_in_memory().unwrap();
        store.insert(&row("42", Direction::Buy, 500)).unwrap();
        store.insert(&row("42", Direction::Sell, 500)).unwrap();
        store.insert(&row("7", Direction::Sell, 500)).unwrap();

        assert_eq!(store.count_by_market(&MarketId::new("42")).unwrap(), 2);
        assert_eq!(store.count_by_market(&MarketId::new("8")).unwrap(), 0);
    }

    #[test]
    fn test_update() {
        let store = SqliteOrderStore::new_in_memory().unwrap();
        let id = store.insert(&row("42", Direction::Sell, 500)).unwrap();
        store.update(id, 510_000_000, 200, 800).unwrap();

        let found = &store.find(&MarketId::new("42"), Direction::Sell).unwrap()[0];
        assert_eq!(found.price, 510_000_000);
        assert_eq!(found.timestamp, 200);
        assert_eq!(found.expiry, 800);
        assert_eq!(found.order_group, "0x0102030405060708090a0b0c");
    }

    #[test]
    fn test_delete_expired() {
        let store = SqliteOrderStore::new_in_memory().unwrap();
        store.insert(&row("1", Direction::Buy, 100)).unwrap();
        store.insert(&row("2", Direction::Buy, 101)).unwrap();
        store.insert(&row("3", Direction::Buy, 99)).unwrap();

        assert_eq!(store.delete_expired(100).unwrap(), 2);
        assert_eq!(store.count_by_market(&MarketId::new("2")).unwrap(), 1);
        assert_eq!(store.count_by_market(&MarketId::new("1")).unwrap(), 0);
    }
}
