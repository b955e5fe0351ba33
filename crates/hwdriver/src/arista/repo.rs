use std::collections::BTreeMap;

use sqlx::SqlitePool;

use hwdriver_types::SegmentationType;

use super::eapi::RemoteNet;

/// Durable record of the bindings the controller intends the switch to
/// hold. Gates repeat RPC calls to the command API and feeds the
/// reconciler's desired view.
#[derive(Clone)]
pub struct ProvisionedNetRepository {
    pool: SqlitePool,
    segmentation_type: SegmentationType,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProvisionedNetRow {
    pub id: i64,
    pub network_id: String,
    pub segmentation_id: Option<i64>,
    pub host_id: Option<String>,
}

impl ProvisionedNetRepository {
    pub fn new(pool: SqlitePool, segmentation_type: SegmentationType) -> Self {
        Self {
            pool,
            segmentation_type,
        }
    }

    /// Creates the backing schema.
    pub async fn initialize(&self) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS arista_provisioned_nets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network_id TEXT(36),
                segmentation_id INTEGER,
                host_id TEXT(255)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drops the backing schema. Intended for tests.
    pub async fn tear_down(&self) -> sqlx::Result<()> {
        sqlx::query("DROP TABLE IF EXISTS arista_provisioned_nets")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a network without hosts, unless any row for it exists.
    pub async fn remember_network(&self, network_id: &str) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM arista_provisioned_nets WHERE network_id = ?")
                .bind(network_id)
                .fetch_one(&mut *tx)
                .await?;
        if existing == 0 {
            sqlx::query("INSERT INTO arista_provisioned_nets (network_id) VALUES (?)")
                .bind(network_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }

    /// Records a host binding. A placeholder row left by
    /// [`Self::remember_network`] is promoted in place; otherwise a fresh
    /// row is inserted.
    pub async fn remember_host(
        &self,
        network_id: &str,
        segmentation_id: u16,
        host_id: &str,
    ) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;

        let placeholder: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM arista_provisioned_nets
            WHERE network_id = ? AND segmentation_id IS NULL AND host_id IS NULL
            LIMIT 1
            "#,
        )
        .bind(network_id)
        .fetch_optional(&mut *tx)
        .await?;

        match placeholder {
            Some(id) => {
                sqlx::query(
                    "UPDATE arista_provisioned_nets SET segmentation_id = ?, host_id = ? WHERE id = ?",
                )
                .bind(i64::from(segmentation_id))
                .bind(host_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO arista_provisioned_nets (network_id, segmentation_id, host_id) VALUES (?, ?, ?)",
                )
                .bind(network_id)
                .bind(i64::from(segmentation_id))
                .bind(host_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await
    }

    /// Deletes every binding of the network.
    pub async fn forget_network(&self, network_id: &str) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM arista_provisioned_nets WHERE network_id = ?")
            .bind(network_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the host's bindings on the network, whatever the segment.
    pub async fn forget_host(&self, network_id: &str, host_id: &str) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM arista_provisioned_nets WHERE network_id = ? AND host_id = ?")
            .bind(network_id)
            .bind(host_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// With no binding given: true iff any row exists for the network.
    /// With a binding: true iff that exact row exists.
    pub async fn is_network_provisioned(
        &self,
        network_id: &str,
        segmentation_id: Option<u16>,
        host_id: Option<&str>,
    ) -> sqlx::Result<bool> {
        let count: i64 = if segmentation_id.is_none() && host_id.is_none() {
            sqlx::query_scalar("SELECT COUNT(*) FROM arista_provisioned_nets WHERE network_id = ?")
                .bind(network_id)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM arista_provisioned_nets
                WHERE network_id = ? AND segmentation_id IS ? AND host_id IS ?
                "#,
            )
            .bind(network_id)
            .bind(segmentation_id.map(i64::from))
            .bind(host_id)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(count > 0)
    }

    pub async fn num_nets_provisioned(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM arista_provisioned_nets")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn num_hosts_for_net(&self, network_id: &str) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM arista_provisioned_nets WHERE network_id = ?")
            .bind(network_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Desired state in the switch's own shape: fully bound rows only,
    /// host lists sorted ascending.
    pub async fn get_network_list(&self) -> sqlx::Result<BTreeMap<String, RemoteNet>> {
        let rows: Vec<ProvisionedNetRow> = sqlx::query_as(
            r#"
            SELECT id, network_id, segmentation_id, host_id
            FROM arista_provisioned_nets
            WHERE segmentation_id IS NOT NULL AND host_id IS NOT NULL
            ORDER BY network_id, host_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut nets: BTreeMap<String, RemoteNet> = BTreeMap::new();
        for row in rows {
            let ProvisionedNetRow {
                network_id,
                segmentation_id: Some(segmentation_id),
                host_id: Some(host_id),
                ..
            } = row
            else {
                continue;
            };

            nets.entry(network_id.clone())
                .or_insert_with(|| RemoteNet {
                    name: network_id.clone(),
                    segmentation_id: segmentation_id as u16,
                    segmentation_type: self.segmentation_type,
                    host_id: Vec::new(),
                })
                .host_id
                .push(host_id);
        }
        Ok(nets)
    }
}
