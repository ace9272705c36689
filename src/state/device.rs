use super::AppState;
use crate::types::*;
use chrono::NaiveDate;

/// Friendly label for a device, shown in the admin panel
fn generate_label() -> String {
    petname::petname(2, "-").unwrap_or_else(|| "unnamed-device".to_string())
}

impl AppState {
    /// Echo a known device id or issue a fresh one.
    ///
    /// Ids the server has never seen are adopted as-is: the identifier
    /// is client-persisted and collision-tolerant, not validated.
    pub async fn register_device(&self, existing: Option<String>) -> DeviceRecord {
        let device_id = match existing.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
            Some(id) => id,
            None => ulid::Ulid::new().to_string(),
        };

        let mut devices = self.devices.write().await;
        devices
            .entry(device_id.clone())
            .or_insert_with(|| DeviceRecord {
                device_id,
                label: generate_label(),
                last_name: None,
                submitted_once: false,
                last_submission_date: None,
            })
            .clone()
    }

    /// Submission gate: may this device submit another question today?
    ///
    /// Returns a user-facing explanation on denial. Advisory only: the
    /// markers key off a client-controlled id, so wiping local storage
    /// resets eligibility.
    pub async fn check_gate(&self, device_id: &str, today: NaiveDate) -> Result<(), String> {
        let devices = self.devices.read().await;
        let record = match devices.get(device_id) {
            Some(r) => r,
            // Unknown device has no markers yet
            None => return Ok(()),
        };

        match self.policy {
            SubmitPolicy::Unlimited => Ok(()),
            SubmitPolicy::OnceEver => {
                if record.submitted_once {
                    Err("Ya has enviado una pregunta.".to_string())
                } else {
                    Ok(())
                }
            }
            SubmitPolicy::OncePerDay => {
                if record.last_submission_date == Some(today) {
                    Err("Ya has enviado una pregunta hoy. Vuelve mañana.".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Persist the gate markers after a successful create
    pub async fn record_submission(&self, device_id: &str, name: &str, today: NaiveDate) {
        let mut devices = self.devices.write().await;
        let record = devices
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceRecord {
                device_id: device_id.to_string(),
                label: generate_label(),
                last_name: None,
                submitted_once: false,
                last_submission_date: None,
            });

        record.last_name = Some(name.to_string());
        record.submitted_once = true;
        record.last_submission_date = Some(today);
    }

    pub async fn device_label(&self, device_id: &str) -> Option<String> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|r| r.label.clone())
    }
}
