// Reading and writing the JSON files handled by ballotctl.

use crate::audit_cli::*;

use serde::Serialize;
use std::fs;

pub fn read_export(path: &str) -> CliResult<BallotsExport> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let export: BallotsExport =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    debug!(
        "read_export: {} ballots for election {}",
        export.ballots.len(),
        export.election_id
    );
    Ok(export)
}

pub fn write_text(path: &str, contents: &str) -> CliResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(WritingFileSnafu { path })?;
        }
    }
    fs::write(path, contents).context(WritingFileSnafu { path })?;
    info!("wrote {}", path);
    Ok(())
}

pub fn write_json<T: Serialize>(path: &str, value: &T) -> CliResult<()> {
    let pretty = serde_json::to_string_pretty(value).context(SerializingJsonSnafu)?;
    write_text(path, &pretty)
}

pub fn write_export(path: &str, export: &BallotsExport) -> CliResult<()> {
    write_json(path, export)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_malformed_files() {
        let dir = std::env::temp_dir().join(format!("ballotctl-io-{}", std::process::id()));
        let missing = dir.join("missing.json");
        assert!(matches!(
            read_export(missing.to_str().unwrap()),
            Err(CliError::OpeningFile { .. })
        ));

        let bad = dir.join("nested").join("bad.json");
        write_text(bad.to_str().unwrap(), "{ \"election_id\": 3 }").unwrap();
        assert!(matches!(
            read_export(bad.to_str().unwrap()),
            Err(CliError::ParsingJson { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_export_round_trips() {
        let eid = ElectionId::from("quiet");
        let export = BallotsExport {
            election_id: eid.clone(),
            genesis_hash: genesis_hash(&eid),
            chain_head: genesis_hash(&eid),
            ballots: vec![],
        };
        let dir = std::env::temp_dir().join(format!("ballotctl-empty-{}", std::process::id()));
        let path = dir.join("ballots.json");
        write_export(path.to_str().unwrap(), &export).unwrap();
        let back = read_export(path.to_str().unwrap()).unwrap();
        assert_eq!(back, export);
        assert_eq!(back.verify().unwrap(), genesis_hash(&eid));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
