//! Updater job DTOs

use serde::Deserialize;
use validator::Validate;

use infra_updater::DataSetKind;

#[derive(Debug, Deserialize, Validate)]
pub struct StartUpdaterJobRequest {
    pub data_set: DataSetKind,
    #[validate(url(message = "is not a valid URL"))]
    pub source_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUpdaterJobsQuery {
    pub data_set: Option<DataSetKind>,
}
