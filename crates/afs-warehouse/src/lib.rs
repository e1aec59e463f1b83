//! Warehouse access for audience validation
//!
//! Resolves Snowflake credentials, runs the validation query for each
//! audience over a single connection and collects the rows.
//!
//! ## Features
//!
//! - `snowflake` - compile the Snowflake client (otherwise connecting fails
//!   with a configuration error)
//!
//! ## Example
//!
//! ```rust,ignore
//! use afs_warehouse::{ConnectionParams, SnowflakeClient, validate_all};
//!
//! let (params, _source) = ConnectionParams::resolve(None)?;
//! let client = SnowflakeClient::connect(&params)?;
//! let outcome = validate_all(client, &audiences).await;
//! ```

pub mod adapter;
pub mod credentials;
pub mod mock;
pub mod snowflake;
pub mod validation;

pub use adapter::{WarehouseClient, QueryOutput, WarehouseError};
pub use credentials::{ConnectionParams, CredentialError, DEFAULT_PROFILE};
pub use mock::{MockWarehouse, MetricCounts};
pub use snowflake::{SnowflakeClient, SnowflakeClientBuilder};
pub use validation::{validate_audience, validate_all, BatchOutcome, AudienceFailure, ValidationError};
