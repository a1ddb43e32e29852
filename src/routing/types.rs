use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The full attribute set resolved for one (org code, interaction id)
/// pair. Endpoint and reliability details are projections of this one
/// record, so a single directory round-trip serves both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingAndReliability {
    pub fqdn: String,
    pub endpoint_urls: Vec<String>,
    pub party_key: String,
    pub cpa_id: String,
    pub sync_reply_mode: String,
    pub retries: u32,
    pub retry_interval: Duration,
    pub persist_duration: String,
    pub ack_requested: bool,
    pub duplicate_elimination: bool,
}

impl RoutingAndReliability {
    pub fn endpoint(&self) -> EndpointDetails {
        EndpointDetails {
            fqdn: self.fqdn.clone(),
            endpoint_urls: self.endpoint_urls.clone(),
            party_key: self.party_key.clone(),
            cpa_id: self.cpa_id.clone(),
        }
    }

    pub fn reliability(&self) -> ReliabilityDetails {
        ReliabilityDetails {
            sync_reply_mode: self.sync_reply_mode.clone(),
            retries: self.retries,
            retry_interval: self.retry_interval,
            persist_duration: self.persist_duration.clone(),
            ack_requested: self.ack_requested,
            duplicate_elimination: self.duplicate_elimination,
        }
    }
}

/// Where to deliver a message for one org/interaction pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDetails {
    pub fqdn: String,
    pub endpoint_urls: Vec<String>,
    pub party_key: String,
    pub cpa_id: String,
}

/// How reliably to deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliabilityDetails {
    pub sync_reply_mode: String,
    pub retries: u32,
    pub retry_interval: Duration,
    pub persist_duration: String,
    pub ack_requested: bool,
    pub duplicate_elimination: bool,
}

/// Parse the ISO 8601 duration form the directory uses for retry and
/// persist intervals, e.g. `PT4S` or `P1DT2H`.
pub fn parse_iso8601_duration(value: &str) -> Result<Duration, String> {
    let rest = value
        .strip_prefix('P')
        .ok_or_else(|| "duration must start with P".to_string())?;
    if rest.is_empty() {
        return Err("duration has no components".to_string());
    }
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    let mut seconds: u64 = 0;
    seconds += scan_components(date_part, &[('D', 86_400)])?;
    seconds += scan_components(time_part, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    Ok(Duration::from_secs(seconds))
}

fn scan_components(part: &str, units: &[(char, u64)]) -> Result<u64, String> {
    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let multiplier = units
            .iter()
            .find(|(unit, _)| *unit == c)
            .map(|(_, m)| *m)
            .ok_or_else(|| format!("unknown duration unit {c:?}"))?;
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before unit {c:?}"))?;
        total += value * multiplier;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err("trailing digits without a unit".to_string());
    }
    Ok(total)
}
