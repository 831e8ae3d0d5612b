//! Alert listing, lookup, and acknowledgement

use anyhow::Result;

use crate::application::dto::{AlertDto, AlertPageDto};
use crate::domain::alert::AlertSearchCriteria;
use crate::infrastructure::alert_repository::AlertRepository;

pub struct AlertQueries {
    repository: AlertRepository,
}

impl AlertQueries {
    pub fn new(repository: AlertRepository) -> Self {
        Self { repository }
    }

    /// Paginated listing, newest triggers first.
    pub async fn list(&self, criteria: &AlertSearchCriteria) -> Result<AlertPageDto> {
        let result = self.repository.list_alerts(criteria).await?;
        Ok(AlertPageDto::from(result))
    }

    pub async fn get(&self, alert_id: i64) -> Result<Option<AlertDto>> {
        let alert = self.repository.get_alert(alert_id).await?;
        Ok(alert.map(AlertDto::from))
    }

    /// Mark an alert as acknowledged. Acknowledging again is a no-op;
    /// an unknown id returns None.
    pub async fn acknowledge(&self, alert_id: i64) -> Result<Option<AlertDto>> {
        let Some(mut alert) = self.repository.get_alert(alert_id).await? else {
            return Ok(None);
        };

        alert.status = alert.status.acknowledge();
        self.repository.update_status(alert_id, alert.status).await?;

        Ok(Some(AlertDto::from(alert)))
    }
}
