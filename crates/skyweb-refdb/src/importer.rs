//! SIA XML importer.
//!
//! The export is a flat list of typed records under a single root:
//! `Espace → Partie → Volume → Geometrie`, `Service → Frequence`, `Ad → Rwy`.
//! Each record flattens into a string-keyed map; links between records are
//! resolved later by the builder.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// One flattened source record: child element / attribute name → trimmed text.
pub type Record = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read export {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("export has no root element")]
    NoRoot,
    #[error("export ended inside <{0}>")]
    Truncated(String),
}

/// Target table of a top-level record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Airspace,
    Part,
    Volume,
    Geometry,
    Service,
    Frequency,
    Aerodrome,
    Runway,
}

impl TableKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Espace" => Some(Self::Airspace),
            "Partie" => Some(Self::Part),
            "Volume" => Some(Self::Volume),
            "Geometrie" => Some(Self::Geometry),
            "Service" => Some(Self::Service),
            "Frequence" => Some(Self::Frequency),
            "Ad" => Some(Self::Aerodrome),
            "Rwy" => Some(Self::Runway),
            _ => None,
        }
    }
}

/// Complete parsed dataset of one SIA export.
#[derive(Debug, Default, Clone)]
pub struct ParsedExport {
    pub airspaces: Vec<Record>,
    pub parts: Vec<Record>,
    pub volumes: Vec<Record>,
    pub geometries: Vec<Record>,
    pub services: Vec<Record>,
    pub frequencies: Vec<Record>,
    pub aerodromes: Vec<Record>,
    pub runways: Vec<Record>,
}

impl ParsedExport {
    fn push(&mut self, kind: TableKind, record: Record) {
        let table = match kind {
            TableKind::Airspace => &mut self.airspaces,
            TableKind::Part => &mut self.parts,
            TableKind::Volume => &mut self.volumes,
            TableKind::Geometry => &mut self.geometries,
            TableKind::Service => &mut self.services,
            TableKind::Frequency => &mut self.frequencies,
            TableKind::Aerodrome => &mut self.aerodromes,
            TableKind::Runway => &mut self.runways,
        };
        table.push(record);
    }

    pub fn counts(&self) -> ExportCounts {
        ExportCounts {
            airspaces: self.airspaces.len(),
            parts: self.parts.len(),
            volumes: self.volumes.len(),
            geometries: self.geometries.len(),
            services: self.services.len(),
            frequencies: self.frequencies.len(),
            aerodromes: self.aerodromes.len(),
            runways: self.runways.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExportCounts {
    pub airspaces: usize,
    pub parts: usize,
    pub volumes: usize,
    pub geometries: usize,
    pub services: usize,
    pub frequencies: usize,
    pub aerodromes: usize,
    pub runways: usize,
}

/// Parse an export file from disk.
pub fn parse_file(path: &Path) -> Result<ParsedExport, ImportError> {
    let xml = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&xml)
}

/// Parse an export document held in memory.
pub fn parse_str(xml: &str) -> Result<ParsedExport, ImportError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result = ParsedExport::default();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut record: Option<(Option<TableKind>, Record)> = None;
    let mut field: Option<(String, String, Option<String>)> = None;
    let mut open_tags: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| ImportError::Xml {
            position: reader.buffer_position(),
            message: e.to_string(),
        })?;
        match event {
            Event::Start(ref e) => {
                let name = local_name(e);
                match depth {
                    0 => saw_root = true,
                    1 => record = Some(begin_record(e, &name)),
                    2 => field = Some((name.clone(), String::new(), pk_attribute(e))),
                    _ => {}
                }
                open_tags.push(name);
                depth += 1;
            }
            Event::Empty(ref e) => {
                let name = local_name(e);
                match depth {
                    0 => saw_root = true,
                    1 => {
                        let (kind, rec) = begin_record(e, &name);
                        if let Some(kind) = kind {
                            result.push(kind, rec);
                        }
                    }
                    2 => {
                        if let Some((_, rec)) = record.as_mut() {
                            rec.insert(name, pk_attribute(e).unwrap_or_default());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) if depth == 3 => {
                if let Some((_, text, _)) = field.as_mut() {
                    let value = t.unescape().map_err(|e| ImportError::Xml {
                        position: reader.buffer_position(),
                        message: e.to_string(),
                    })?;
                    text.push_str(&value);
                }
            }
            Event::CData(ref c) if depth == 3 => {
                if let Some((_, text, _)) = field.as_mut() {
                    text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                open_tags.pop();
                match depth {
                    2 => {
                        if let (Some((key, text, pk)), Some((_, rec))) = (field.take(), record.as_mut()) {
                            let text = text.trim().to_string();
                            let value = if text.is_empty() { pk.unwrap_or_default() } else { text };
                            rec.insert(key, value);
                        }
                    }
                    1 => {
                        if let Some((Some(kind), rec)) = record.take() {
                            result.push(kind, rec);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = open_tags.pop() {
        return Err(ImportError::Truncated(open));
    }
    if !saw_root {
        return Err(ImportError::NoRoot);
    }

    let counts = result.counts();
    info!(
        "Parsed SIA export: {} espaces, {} parties, {} volumes, {} geometries, {} services, {} frequencies, {} aerodromes, {} runways",
        counts.airspaces,
        counts.parts,
        counts.volumes,
        counts.geometries,
        counts.services,
        counts.frequencies,
        counts.aerodromes,
        counts.runways,
    );
    Ok(result)
}

fn begin_record(e: &BytesStart, name: &str) -> (Option<TableKind>, Record) {
    let mut rec = Record::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        rec.insert(key, value);
    }
    (TableKind::from_tag(name), rec)
}

/// `pk` attribute of a cross-reference element such as `<Espace pk="300"/>`.
fn pk_attribute(e: &BytesStart) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        (attr.key.local_name().as_ref() == b"pk")
            .then(|| attr.unescape_value().ok().map(|v| v.trim().to_string()))
            .flatten()
    })
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SIA>
  <Espace>
    <EspaceId>ESP001</EspaceId>
    <Nom>PARIS TMA 1</Nom>
    <TypeEspace>TMA</TypeEspace>
    <Classe>D</Classe>
  </Espace>
  <Espace>
    <EspaceId>ESP002</EspaceId>
    <Nom>BEAUVAIS CTR</Nom>
    <TypeEspace>CTR</TypeEspace>
    <Classe>D</Classe>
  </Espace>
  <Partie>
    <PartieId>P001</PartieId>
    <EspaceId>ESP001</EspaceId>
    <Nom>Partie 1</Nom>
  </Partie>
  <Volume>
    <VolumeId>V001</VolumeId>
    <PartieId>P001</PartieId>
    <Plancher>SFC</Plancher>
    <PlancherRef>AMSL</PlancherRef>
    <PlancherVal>0</PlancherVal>
    <Plafond>FL065</Plafond>
    <PlafondRef>STD</PlafondRef>
    <PlafondVal>6500</PlafondVal>
    <HorCode>H24</HorCode>
  </Volume>
  <Geometrie>
    <PartieId>P001</PartieId>
    <WKT>POLYGON((2.0 48.0, 2.5 48.0, 2.5 49.0, 2.0 49.0, 2.0 48.0))</WKT>
  </Geometrie>
  <Service>
    <IndicLieu>LFPG</IndicLieu>
    <Indicatif>PARIS Approche</Indicatif>
    <TypeService>APP</TypeService>
    <Langue>fr</Langue>
  </Service>
  <Frequence>
    <IndicLieu>LFPG</IndicLieu>
    <Frequence>119.250</Frequence>
    <Espacement>8.33</Espacement>
    <Secteur>Nord</Secteur>
    <Remarques></Remarques>
  </Frequence>
  <Ad>
    <AdCode>LFXU</AdCode>
    <AdNomComplet>LES MUREAUX</AdNomComplet>
    <ArpLat>48.9897</ArpLat>
    <ArpLon>1.8815</ArpLon>
    <AdRefAltFt>164</AdRefAltFt>
  </Ad>
  <Rwy>
    <AdCode>LFXU</AdCode>
    <Identifiant>12/30</Identifiant>
    <Longueur>700</Longueur>
  </Rwy>
</SIA>
"#;

    #[test]
    fn parses_every_table() {
        let parsed = parse_str(MINIMAL_XML).unwrap();
        let counts = parsed.counts();
        assert_eq!(counts.airspaces, 2);
        assert_eq!(counts.parts, 1);
        assert_eq!(counts.volumes, 1);
        assert_eq!(counts.geometries, 1);
        assert_eq!(counts.services, 1);
        assert_eq!(counts.frequencies, 1);
        assert_eq!(counts.aerodromes, 1);
        assert_eq!(counts.runways, 1);
    }

    #[test]
    fn flattens_children_with_trimmed_text() {
        let parsed = parse_str(MINIMAL_XML).unwrap();
        let espace = &parsed.airspaces[0];
        assert_eq!(espace["Nom"], "PARIS TMA 1");
        assert_eq!(espace["TypeEspace"], "TMA");
        assert_eq!(parsed.frequencies[0]["Remarques"], "");
        assert!(parsed.geometries[0]["WKT"].starts_with("POLYGON(("));
    }

    #[test]
    fn strips_namespaces_and_keeps_attributes() {
        let xml = r#"<sia:SIA xmlns:sia="urn:sia">
            <sia:Espace pk="300" lk="[LF][TMA PARIS]">
                <sia:Nom> PARIS </sia:Nom>
                <sia:Territoire pk="100"/>
            </sia:Espace>
            <sia:Partie pk="301"><sia:Espace pk="300"/><sia:Nom>1</sia:Nom></sia:Partie>
        </sia:SIA>"#;
        let parsed = parse_str(xml).unwrap();
        let espace = &parsed.airspaces[0];
        assert_eq!(espace["pk"], "300");
        assert_eq!(espace["Nom"], "PARIS");
        assert_eq!(espace["Territoire"], "100");
        assert_eq!(parsed.parts[0]["Espace"], "300");
    }

    #[test]
    fn unknown_tables_are_skipped() {
        let xml = "<SIA><Balise><Nom>X</Nom></Balise><Espace><Nom>A</Nom></Espace></SIA>";
        let parsed = parse_str(xml).unwrap();
        assert_eq!(parsed.airspaces.len(), 1);
        assert_eq!(parsed.counts().parts, 0);
    }

    #[test]
    fn missing_tables_are_empty_not_errors() {
        let parsed = parse_str("<SIA></SIA>").unwrap();
        assert_eq!(parsed.counts(), ExportCounts::default());
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(parse_str("<SIA><Espace><Nom>A</Espace></SIA>").is_err());
        assert!(matches!(parse_str("<SIA><Espace>"), Err(ImportError::Truncated(_))));
        assert!(matches!(parse_str(""), Err(ImportError::NoRoot)));
    }
}
