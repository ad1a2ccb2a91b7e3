pub mod chi;
pub mod chit;
pub mod chop_config;

pub use chi::{ClickHouseInstallation, ClickHouseInstallationSpec, ClickHouseInstallationStatus};
pub use chit::{ClickHouseInstallationTemplate, ClickHouseInstallationTemplateSpec};
pub use chop_config::{ChopConfigSpec, ClickHouseOperatorConfiguration};
