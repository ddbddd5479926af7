use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::DomainSet;
use crate::domain::Domain;
use crate::error::{Result, VigieError};

/// Column order of the persisted registry.
pub const CSV_HEADERS: [&str; 7] = [
    "name",
    "http_status",
    "https_status",
    "SIREN",
    "type",
    "sources",
    "script",
];

/// Loads the registry; a missing file is an empty registry.
pub fn load(path: &Path) -> Result<DomainSet> {
    match File::open(path) {
        Ok(file) => {
            let domains = read_from(file)?;
            debug!(path = %path.display(), count = domains.len(), "Loaded registry");
            Ok(domains)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No registry yet, starting empty");
            Ok(DomainSet::new())
        }
        Err(e) => Err(VigieError::file(path, e)),
    }
}

/// Reads registry rows by position, skipping the header row.
pub fn read_from<R: Read>(reader: R) -> Result<DomainSet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut domains = DomainSet::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| {
            record
                .get(i)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
        };

        let name = field(0).ok_or_else(|| VigieError::MalformedRow {
            // Header is row 1
            row: index + 2,
            reason: "empty name".to_string(),
        })?;

        let domain = Domain {
            name: name.to_lowercase(),
            http_status: field(1),
            https_status: field(2),
            siren: field(3),
            kind: field(4),
            sources: field(5),
            script: field(6),
            ..Domain::default()
        };

        if domains.contains(&domain) {
            warn!(domain = %domain.name, row = index + 2, "Duplicate registry row ignored");
            continue;
        }
        domains.insert(domain);
    }
    Ok(domains)
}

/// Writes the registry in registry order.
pub fn write(path: &Path, domains: &DomainSet) -> Result<()> {
    let file = File::create(path).map_err(|e| VigieError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    write_to(&mut writer, domains)?;
    writer.flush().map_err(|e| VigieError::file(path, e))?;
    debug!(path = %path.display(), count = domains.len(), "Wrote registry");
    Ok(())
}

pub fn write_to<W: Write>(writer: W, domains: &DomainSet) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    writer.write_record(CSV_HEADERS)?;
    for domain in domains {
        let opt = |value: &Option<String>| value.clone().unwrap_or_default();
        writer.write_record([
            domain.name.clone(),
            opt(&domain.http_status),
            opt(&domain.https_status),
            opt(&domain.siren),
            opt(&domain.kind),
            opt(&domain.sources),
            opt(&domain.script),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Scheme;

    const SAMPLE: &str = "\
name,http_status,https_status,SIREN,type,sources,script
www.exemple.gouv.fr,200 OK,,,,,
mairie.exemple.gouv.fr,,\"301 Moved Permanently https://a.example/?x=1,2\",213000000,Commune,Banatic,import.py
";

    #[test]
    fn test_read_then_write_is_sorted() {
        let domains = read_from(SAMPLE.as_bytes()).unwrap();
        assert_eq!(domains.len(), 2);

        let mairie = domains.get(&Domain::new("mairie.exemple.gouv.fr")).unwrap();
        assert_eq!(
            mairie.status(Scheme::Https),
            Some("301 Moved Permanently https://a.example/?x=1,2")
        );
        assert_eq!(mairie.siren.as_deref(), Some("213000000"));
        assert_eq!(mairie.kind.as_deref(), Some("Commune"));
        assert_eq!(mairie.http_status, None);

        let mut out = Vec::new();
        write_to(&mut out, &domains).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\
name,http_status,https_status,SIREN,type,sources,script
mairie.exemple.gouv.fr,,\"301 Moved Permanently https://a.example/?x=1,2\",213000000,Commune,Banatic,import.py
www.exemple.gouv.fr,200 OK,,,,,
"
        );
    }

    #[test]
    fn test_duplicate_rows_keep_first() {
        let csv = "name,http_status,https_status\na.example.fr,200 OK,\na.example.fr,Timeout,\n";
        let domains = read_from(csv.as_bytes()).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(
            domains.iter().next().unwrap().http_status.as_deref(),
            Some("200 OK")
        );
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let csv = "name,http_status\n,200 OK\n";
        assert!(matches!(
            read_from(csv.as_bytes()),
            Err(VigieError::MalformedRow { row: 2, .. })
        ));
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.csv");
        assert!(load(&path).unwrap().is_empty());

        let domains: DomainSet = [Domain::new("b.example.fr"), Domain::new("a.example.fr")].into();
        write(&path, &domains).unwrap();
        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.iter().next().unwrap().name, "a.example.fr");
    }
}
