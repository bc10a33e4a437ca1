//! Backing store collaborators
//!
//! The fetch layer only sees two seams: a [`SectionSource`] produces one named
//! section of a region record, and a [`RegionCatalog`] enumerates every known
//! region. [`PgRegionStore`] implements both on top of the PostGIS database
//! holding the protected-area and county geometries.

use crate::error::{Result, StatsError};
use crate::models::{RegionKey, SECTION_GAP_STATUS, SECTION_TOTAL};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_postgres::NoTls;
use tracing::debug;

/// One independently fetchable section of a region record
#[async_trait]
pub trait SectionSource: Send + Sync {
    /// Section name under which the result is merged into the record
    fn name(&self) -> &str;

    /// Fetch this section for `key`
    ///
    /// `Ok(None)` means the store has no data for this section; the section is
    /// omitted without counting as a failure.
    async fn fetch(&self, key: &RegionKey) -> Result<Option<Value>>;
}

/// Enumeration of every known region
#[async_trait]
pub trait RegionCatalog: Send + Sync {
    async fn list_regions(&self) -> Result<Vec<RegionKey>>;
}

const SUMMARY_SQL: &str = "
    SELECT c.name,
        COUNT(n.nypad_id)::bigint AS pa_count,
        CEIL(AVG(ST_Area(n.wkb_geometry) * 0.00024711))::bigint AS pa_mean,
        CEIL(ST_Area(c.wkb_geometry) * 0.00024711)::bigint AS county_acres,
        CEIL(SUM(ST_Area(ST_Intersection(n.wkb_geometry, c.wkb_geometry)) * 0.00024711))::bigint AS pa_acres
    FROM nypad_2017 n, counties_shoreline c
    WHERE ST_Intersects(c.wkb_geometry, n.wkb_geometry)
        AND c.abbreviation = $1
    GROUP BY c.name, county_acres";

const GAP_STATUS_SQL: &str = "
    SELECT n.gap_sts::text AS gap_sts,
        COUNT(n.nypad_id)::bigint AS total,
        CEIL(SUM(ST_Area(ST_Intersection(n.wkb_geometry, c.wkb_geometry)) * 0.00024711))::bigint AS acres,
        CEIL(AVG(ST_Area(n.wkb_geometry) * 0.00024711))::bigint AS mean
    FROM nypad_2017 n, counties_shoreline c
    WHERE ST_Intersects(c.wkb_geometry, n.wkb_geometry)
        AND c.abbreviation = $1
    GROUP BY n.gap_sts
    ORDER BY n.gap_sts";

const CATALOG_SQL: &str = "SELECT abbreviation FROM counties_shoreline";

/// PostGIS-backed region store
///
/// Keys are always bound as statement parameters, so no escaping or
/// rewriting of the key is needed (or done) here.
#[derive(Clone)]
pub struct PgRegionStore {
    pool: Pool,
}

impl PgRegionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a connection pool for `database_url` with at most `max_size` connections
    pub fn connect(database_url: &str, max_size: usize) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(database_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StatsError::DatabaseError(format!("Failed to create pool: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// The section sources making up a full region record
    pub fn sections(&self) -> Vec<Arc<dyn SectionSource>> {
        vec![
            Arc::new(SummarySection {
                pool: self.pool.clone(),
            }),
            Arc::new(GapStatusSection {
                pool: self.pool.clone(),
            }),
        ]
    }
}

#[async_trait]
impl RegionCatalog for PgRegionStore {
    async fn list_regions(&self) -> Result<Vec<RegionKey>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| StatsError::CatalogReadFailed(e.to_string()))?;
        let rows = client
            .query(CATALOG_SQL, &[])
            .await
            .map_err(|e| StatsError::CatalogReadFailed(e.to_string()))?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let abbreviation: Option<String> = row
                .try_get("abbreviation")
                .map_err(|e| StatsError::CatalogReadFailed(e.to_string()))?;
            if let Some(abbreviation) = abbreviation {
                keys.push(RegionKey::new(abbreviation));
            }
        }

        debug!("Read {} regions from catalog", keys.len());
        Ok(keys)
    }
}

/// Feature count, mean feature acreage, county acreage and protected acreage
struct SummarySection {
    pool: Pool,
}

#[async_trait]
impl SectionSource for SummarySection {
    fn name(&self) -> &str {
        SECTION_TOTAL
    }

    async fn fetch(&self, key: &RegionKey) -> Result<Option<Value>> {
        let client = self.pool.get().await?;
        let rows = client.query(SUMMARY_SQL, &[&key.as_str()]).await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        Ok(Some(json!({
            "name": row.try_get::<_, Option<String>>("name")?,
            "pa_count": row.try_get::<_, Option<i64>>("pa_count")?,
            "pa_mean": row.try_get::<_, Option<i64>>("pa_mean")?,
            "county_acres": row.try_get::<_, Option<i64>>("county_acres")?,
            "pa_acres": row.try_get::<_, Option<i64>>("pa_acres")?,
        })))
    }
}

/// Per GAP status code: feature count, protected acreage and mean acreage
struct GapStatusSection {
    pool: Pool,
}

#[async_trait]
impl SectionSource for GapStatusSection {
    fn name(&self) -> &str {
        SECTION_GAP_STATUS
    }

    async fn fetch(&self, key: &RegionKey) -> Result<Option<Value>> {
        let client = self.pool.get().await?;
        let rows = client.query(GAP_STATUS_SQL, &[&key.as_str()]).await?;

        let mut statuses = Vec::with_capacity(rows.len());
        for row in &rows {
            statuses.push(json!({
                "gap_sts": row.try_get::<_, Option<String>>("gap_sts")?,
                "total": row.try_get::<_, Option<i64>>("total")?,
                "acres": row.try_get::<_, Option<i64>>("acres")?,
                "mean": row.try_get::<_, Option<i64>>("mean")?,
            }));
        }

        Ok(Some(Value::Array(statuses)))
    }
}
