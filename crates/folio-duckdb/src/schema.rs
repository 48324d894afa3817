/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `FOLIO_DUCKDB_MEMORY`, default `"1GB"`). Always set an explicit
/// limit: the DuckDB default (80% of system RAM) is not acceptable for a
/// server process.
///
/// Aggregate tables keep running sums and sample counts rather than
/// pre-computed averages. `avgDuration` and `bounceRate` are derived at read
/// time so every sample contributes.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SETTINGS
-- ===========================================
-- Keys stored in this table:
--   'jwt_secret' – HMAC secret for dashboard tokens when FOLIO_JWT_SECRET is unset
--   'version'    – Database schema version
CREATE TABLE IF NOT EXISTS settings (
    key             VARCHAR PRIMARY KEY,
    value           VARCHAR NOT NULL
);

-- ===========================================
-- VISIT EVENTS (one row per admitted visit)
-- ===========================================
CREATE TABLE IF NOT EXISTS visit_events (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    path            VARCHAR NOT NULL,
    ip_address      VARCHAR,
    user_agent      VARCHAR,
    referer         VARCHAR,
    country         VARCHAR(2),                    -- ISO 3166-1 alpha-2
    device          VARCHAR,                       -- 'Desktop' | 'Mobile' | 'Tablet'
    browser         VARCHAR,
    os              VARCHAR,
    session_id      VARCHAR,
    duration        DOUBLE,                        -- seconds
    is_unique       BOOLEAN NOT NULL DEFAULT true,
    is_bounce       BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL
);
-- Dedup lookback: same ip + path within the window
CREATE INDEX IF NOT EXISTS idx_visit_events_ip_path_time
    ON visit_events(ip_address, path, created_at);
-- Breakdown reports over a time range
CREATE INDEX IF NOT EXISTS idx_visit_events_time
    ON visit_events(created_at);

-- ===========================================
-- VISIT AGGREGATES (daily rollup per path)
-- ===========================================
CREATE TABLE IF NOT EXISTS visit_aggregates (
    date            DATE NOT NULL,
    path            VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0,
    page_views      BIGINT NOT NULL DEFAULT 0,
    unique_visitors BIGINT NOT NULL DEFAULT 0,
    duration_sum    DOUBLE NOT NULL DEFAULT 0,
    duration_count  BIGINT NOT NULL DEFAULT 0,     -- visits that reported a duration
    bounces         BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (date, path)
);

-- ===========================================
-- DEVICE ANALYTICS (daily rollup per device/browser/os)
-- ===========================================
CREATE TABLE IF NOT EXISTS device_analytics (
    date            DATE NOT NULL,
    device_type     VARCHAR NOT NULL,
    browser         VARCHAR NOT NULL,
    os              VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0,
    sessions        BIGINT NOT NULL DEFAULT 0,
    duration_sum    DOUBLE NOT NULL DEFAULT 0,
    duration_count  BIGINT NOT NULL DEFAULT 0,
    bounces         BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (date, device_type, browser, os)
);

-- ===========================================
-- TRAFFIC SOURCES (daily rollup per source/medium/campaign)
-- ===========================================
CREATE TABLE IF NOT EXISTS traffic_sources (
    date            DATE NOT NULL,
    source          VARCHAR NOT NULL,
    medium          VARCHAR NOT NULL,
    campaign        VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0,
    sessions        BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (date, source, medium, campaign)
);

-- ===========================================
-- USER INTERACTIONS (clicks, downloads; never deduplicated)
-- ===========================================
CREATE TABLE IF NOT EXISTS user_interactions (
    id              VARCHAR PRIMARY KEY,
    session_id      VARCHAR,
    path            VARCHAR NOT NULL,
    action          VARCHAR NOT NULL,              -- e.g. 'click' | 'download'
    element         VARCHAR,
    value           VARCHAR,
    metadata        VARCHAR,                       -- JSON string (nullable)
    created_at      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_user_interactions_action_time
    ON user_interactions(action, created_at);

-- ===========================================
-- CONTACTS (written by the contact form; counted by reports)
-- ===========================================
CREATE TABLE IF NOT EXISTS contacts (
    id              VARCHAR PRIMARY KEY,
    name            VARCHAR NOT NULL,
    email           VARCHAR NOT NULL,
    message         VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_contacts_time ON contacts(created_at);
"#
    )
}
