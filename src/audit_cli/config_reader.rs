use crate::audit_cli::*;

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "contestName")]
    pub contest_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "contestDate")]
    pub contest_date: Option<String>,
    #[serde(rename = "contestOffice")]
    pub contest_office: Option<String>,
}

/// The `config` section of a summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub contest: String,
    pub date: Option<String>,
    pub office: Option<String>,
    #[serde(rename = "electionId")]
    pub election_id: String,
    pub seats: u32,
    #[serde(rename = "chainHead")]
    pub chain_head: String,
    pub threshold: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ContestCandidate {
    pub id: String,
    pub username: Option<String>,
    #[serde(rename = "nominatedBy")]
    pub nominated_by: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ContestGroup {
    pub name: String,
    #[serde(rename = "maxElected")]
    pub max_elected: Option<u32>,
    pub candidates: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ContestConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "electionId")]
    pub election_id: String,
    pub seats: u32,
    pub candidates: Vec<ContestCandidate>,
    #[serde(rename = "winnerGroups", default)]
    pub winner_groups: Vec<ContestGroup>,
    #[serde(rename = "ballotsFile")]
    pub ballots_file: String,
    #[serde(rename = "decimalPlaces")]
    pub decimal_places: Option<u32>,
}

// Largest scale a rust_decimal value can carry.
const MAX_DECIMAL_PLACES: u32 = 28;

impl ContestConfig {
    pub fn candidate_ids(&self) -> Vec<CandidateId> {
        self.candidates
            .iter()
            .map(|c| CandidateId::from(c.id.as_str()))
            .collect()
    }

    pub fn tally_rules(&self) -> CliResult<TallyRules> {
        let decimal_places = self
            .decimal_places
            .unwrap_or(TallyRules::DEFAULT_DECIMAL_PLACES);
        if decimal_places > MAX_DECIMAL_PLACES {
            whatever!(
                "decimalPlaces must be at most {}, got {}",
                MAX_DECIMAL_PLACES,
                decimal_places
            );
        }
        let groups: Vec<WinnerGroup> = self
            .winner_groups
            .iter()
            .map(|g| WinnerGroup {
                name: g.name.clone(),
                max_elected: g.max_elected,
                candidates: g
                    .candidates
                    .iter()
                    .map(|c| CandidateId::from(c.as_str()))
                    .collect(),
            })
            .collect();
        Ok(TallyRules {
            seats: self.seats,
            groups,
            decimal_places,
        })
    }
}

pub fn read_config(path: &str) -> CliResult<ContestConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

pub fn read_summary(path: &str) -> CliResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}
