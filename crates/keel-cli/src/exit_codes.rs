//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - bad name, values, revision or incompatible chart
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - template rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Chart error - invalid chart directory or Chart.yaml
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Release error - the release does not exist or is in the wrong state
pub const RELEASE_ERROR: i32 = 6;

/// Cluster error - a cluster call, hook or wait failed
pub const CLUSTER_ERROR: i32 = 7;
