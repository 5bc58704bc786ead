//! Parameter sources: where a remap reads its parameter tables from.
//!
//! A `ParameterSource` hands out parsed tables by file name and optional
//! reconstruction id. `Scan` and `Study` read a scanner directory lazily;
//! `ParameterMap` holds tables supplied directly.

use pvmap_core::{
    FileSystemProvider, ParamError, ParamFile, ParameterTable, ParsedValue, SourceProvider,
};
use serde::Serialize;
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Reconstruction used for `visu_pars`/`reco` lookups without an explicit id.
pub const DEFAULT_RECO_ID: u32 = 1;

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Supplier of parameter tables for one remap.
pub trait ParameterSource {
    /// The table for `file`, or `None` when the source does not have it.
    ///
    /// `reco_id` only matters for reco-scoped files; `None` means the
    /// source's default reconstruction.
    fn parameters(
        &self,
        file: ParamFile,
        reco_id: Option<u32>,
    ) -> Result<Option<&ParameterTable>, ParamError>;

    /// Study-level sources only carry the subject file.
    fn is_study(&self) -> bool {
        false
    }

    fn scan_id(&self) -> Option<u32> {
        None
    }

    fn reco_id(&self) -> Option<u32> {
        None
    }
}

// ──────────────────────────────────────────────
// Lazy tables
// ──────────────────────────────────────────────

/// A parameter file that is parsed on first access and kept afterwards.
/// A missing file reads as no table.
#[derive(Default)]
struct LazyTable {
    file: Option<(PathBuf, Rc<dyn SourceProvider>)>,
    cell: OnceCell<Option<ParameterTable>>,
}

impl LazyTable {
    fn at(path: PathBuf, provider: &Rc<dyn SourceProvider>) -> Self {
        LazyTable {
            file: Some((path, Rc::clone(provider))),
            cell: OnceCell::new(),
        }
    }

    fn loaded(table: ParameterTable) -> Self {
        LazyTable {
            file: None,
            cell: OnceCell::from(Some(table)),
        }
    }

    fn get(&self) -> Result<Option<&ParameterTable>, ParamError> {
        if let Some(table) = self.cell.get() {
            return Ok(table.as_ref());
        }
        let table = match &self.file {
            Some((path, provider)) if provider.is_file(path) => {
                log::debug!("parsing parameter file {}", path.display());
                Some(ParameterTable::load(path, &**provider)?)
            }
            _ => None,
        };
        Ok(self.cell.get_or_init(|| table).as_ref())
    }
}

impl fmt::Debug for LazyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTable")
            .field("path", &self.file.as_ref().map(|(path, _)| path))
            .field("loaded", &self.cell.get().is_some())
            .finish()
    }
}

fn filesystem() -> Rc<dyn SourceProvider> {
    Rc::new(FileSystemProvider)
}

// ──────────────────────────────────────────────
// Reco
// ──────────────────────────────────────────────

/// One reconstruction of a scan (`pdata/<id>/`).
#[derive(Debug)]
pub struct Reco {
    id: u32,
    visu_pars: LazyTable,
    reco: LazyTable,
}

impl Reco {
    pub fn new(id: u32) -> Self {
        Reco {
            id,
            visu_pars: LazyTable::default(),
            reco: LazyTable::default(),
        }
    }

    /// A reconstruction directory holding `visu_pars` and `reco` files.
    pub fn open(dir: &Path, id: u32) -> Self {
        Self::open_with(dir, id, &filesystem())
    }

    pub fn open_with(dir: &Path, id: u32, provider: &Rc<dyn SourceProvider>) -> Self {
        Reco {
            id,
            visu_pars: LazyTable::at(dir.join(ParamFile::VisuPars.as_str()), provider),
            reco: LazyTable::at(dir.join(ParamFile::Reco.as_str()), provider),
        }
    }

    pub fn with_visu_pars(mut self, table: ParameterTable) -> Self {
        self.visu_pars = LazyTable::loaded(table);
        self
    }

    pub fn with_reco(mut self, table: ParameterTable) -> Self {
        self.reco = LazyTable::loaded(table);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn visu_pars(&self) -> Result<Option<&ParameterTable>, ParamError> {
        self.visu_pars.get()
    }

    pub fn reco(&self) -> Result<Option<&ParameterTable>, ParamError> {
        self.reco.get()
    }
}

// ──────────────────────────────────────────────
// Scan
// ──────────────────────────────────────────────

/// A scan directory: `method`, `acqp`, and `pdata/<reco>/` reconstructions.
/// The study's `subject` file is shared with the parent study.
#[derive(Debug)]
pub struct Scan {
    id: Option<u32>,
    method: LazyTable,
    acqp: LazyTable,
    subject: Rc<LazyTable>,
    recos: BTreeMap<u32, Reco>,
    selected_reco: Option<u32>,
}

impl Scan {
    /// An empty in-memory scan, filled with the `with_*` builders.
    pub fn new(id: u32) -> Self {
        Scan {
            id: Some(id),
            method: LazyTable::default(),
            acqp: LazyTable::default(),
            subject: Rc::new(LazyTable::default()),
            recos: BTreeMap::new(),
            selected_reco: None,
        }
    }

    /// Open a scan directory. Files are parsed on first use; only the
    /// `pdata` listing is read here.
    ///
    /// The scan id is the directory name when it is numeric. A `subject`
    /// file in the parent (study) directory is picked up.
    pub fn open(dir: &Path) -> Result<Scan, ParamError> {
        Self::open_with(dir, &filesystem())
    }

    /// [`Scan::open`] reading through `provider`.
    pub fn open_with(dir: &Path, provider: &Rc<dyn SourceProvider>) -> Result<Scan, ParamError> {
        let id = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse().ok());
        let subject = dir
            .parent()
            .map(|study| LazyTable::at(study.join(ParamFile::Subject.as_str()), provider))
            .unwrap_or_default();
        let mut recos = BTreeMap::new();
        for (reco_id, reco_dir) in numbered_dirs(&dir.join("pdata"), &**provider)? {
            recos.insert(reco_id, Reco::open_with(&reco_dir, reco_id, provider));
        }
        log::debug!(
            "opened scan {} with recos {:?}",
            dir.display(),
            recos.keys().collect::<Vec<_>>()
        );
        Ok(Scan {
            id,
            method: LazyTable::at(dir.join(ParamFile::Method.as_str()), provider),
            acqp: LazyTable::at(dir.join(ParamFile::Acqp.as_str()), provider),
            subject: Rc::new(subject),
            recos,
            selected_reco: None,
        })
    }

    pub fn with_method(mut self, table: ParameterTable) -> Self {
        self.method = LazyTable::loaded(table);
        self
    }

    pub fn with_acqp(mut self, table: ParameterTable) -> Self {
        self.acqp = LazyTable::loaded(table);
        self
    }

    pub fn with_subject(mut self, table: ParameterTable) -> Self {
        self.subject = Rc::new(LazyTable::loaded(table));
        self
    }

    pub fn with_reco(mut self, reco: Reco) -> Self {
        self.recos.insert(reco.id(), reco);
        self
    }

    /// Mark the reconstruction being converted. It is reported as
    /// [`ParameterSource::reco_id`] to map overlays.
    pub fn select_reco(mut self, reco_id: u32) -> Self {
        self.selected_reco = Some(reco_id);
        self
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn reco_ids(&self) -> Vec<u32> {
        self.recos.keys().copied().collect()
    }

    pub fn reco(&self, reco_id: u32) -> Option<&Reco> {
        self.recos.get(&reco_id)
    }

    /// Case-insensitive key search across every parameter file of the scan.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, ParamError> {
        let mut hits = Vec::new();
        for file in [ParamFile::Subject, ParamFile::Method, ParamFile::Acqp] {
            if let Some(table) = self.parameters(file, None)? {
                collect_hits(table, file, None, query, &mut hits);
            }
        }
        for reco in self.recos.values() {
            if let Some(table) = reco.visu_pars()? {
                collect_hits(table, ParamFile::VisuPars, Some(reco.id), query, &mut hits);
            }
            if let Some(table) = reco.reco()? {
                collect_hits(table, ParamFile::Reco, Some(reco.id), query, &mut hits);
            }
        }
        Ok(hits)
    }
}

impl ParameterSource for Scan {
    fn parameters(
        &self,
        file: ParamFile,
        reco_id: Option<u32>,
    ) -> Result<Option<&ParameterTable>, ParamError> {
        match file {
            ParamFile::Method => self.method.get(),
            ParamFile::Acqp => self.acqp.get(),
            ParamFile::Subject => self.subject.get(),
            ParamFile::VisuPars | ParamFile::Reco => {
                let id = reco_id.unwrap_or(DEFAULT_RECO_ID);
                let Some(reco) = self.recos.get(&id) else {
                    log::debug!("scan {:?} has no reco {}", self.id, id);
                    return Ok(None);
                };
                if file == ParamFile::VisuPars {
                    reco.visu_pars()
                } else {
                    reco.reco()
                }
            }
        }
    }

    fn scan_id(&self) -> Option<u32> {
        self.id
    }

    fn reco_id(&self) -> Option<u32> {
        self.selected_reco
    }
}

/// One parameter matched by [`Scan::search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub file: ParamFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reco_id: Option<u32>,
    pub key: String,
    pub value: Value,
}

fn collect_hits(
    table: &ParameterTable,
    file: ParamFile,
    reco_id: Option<u32>,
    query: &str,
    hits: &mut Vec<SearchHit>,
) {
    hits.extend(table.search(query).into_iter().map(|entry| SearchHit {
        file,
        reco_id,
        key: entry.key.clone(),
        value: entry.value.to_json(),
    }));
}

// ──────────────────────────────────────────────
// Study
// ──────────────────────────────────────────────

/// A study directory: a `subject` file plus numbered scan directories.
#[derive(Debug)]
pub struct Study {
    subject: Rc<LazyTable>,
    scans: BTreeMap<u32, Scan>,
}

impl Default for Study {
    fn default() -> Self {
        Self::new()
    }
}

impl Study {
    pub fn new() -> Self {
        Study {
            subject: Rc::new(LazyTable::default()),
            scans: BTreeMap::new(),
        }
    }

    /// Open a study directory. Numeric subdirectories holding a `method` or
    /// `acqp` file are scans.
    pub fn open(dir: &Path) -> Result<Study, ParamError> {
        Self::open_with(dir, &filesystem())
    }

    /// [`Study::open`] reading through `provider`.
    pub fn open_with(dir: &Path, provider: &Rc<dyn SourceProvider>) -> Result<Study, ParamError> {
        let subject = Rc::new(LazyTable::at(
            dir.join(ParamFile::Subject.as_str()),
            provider,
        ));
        let mut scans = BTreeMap::new();
        for (scan_id, scan_dir) in numbered_dirs(dir, &**provider)? {
            let is_scan = [ParamFile::Method, ParamFile::Acqp]
                .iter()
                .any(|f| provider.is_file(&scan_dir.join(f.as_str())));
            if !is_scan {
                continue;
            }
            let mut scan = Scan::open_with(&scan_dir, provider)?;
            scan.subject = Rc::clone(&subject);
            scans.insert(scan_id, scan);
        }
        Ok(Study { subject, scans })
    }

    /// Set the subject table; every scan added so far shares it.
    pub fn with_subject(mut self, table: ParameterTable) -> Self {
        self.subject = Rc::new(LazyTable::loaded(table));
        for scan in self.scans.values_mut() {
            scan.subject = Rc::clone(&self.subject);
        }
        self
    }

    /// Add a scan. The scan's own subject table is replaced by the study's.
    pub fn with_scan(mut self, mut scan: Scan) -> Self {
        scan.subject = Rc::clone(&self.subject);
        let id = scan.id.unwrap_or(self.scans.len() as u32 + 1);
        self.scans.insert(id, scan);
        self
    }

    pub fn scan_ids(&self) -> Vec<u32> {
        self.scans.keys().copied().collect()
    }

    pub fn scan(&self, scan_id: u32) -> Option<&Scan> {
        self.scans.get(&scan_id)
    }
}

impl ParameterSource for Study {
    fn parameters(
        &self,
        file: ParamFile,
        _reco_id: Option<u32>,
    ) -> Result<Option<&ParameterTable>, ParamError> {
        match file {
            ParamFile::Subject => self.subject.get(),
            _ => Ok(None),
        }
    }

    fn is_study(&self) -> bool {
        true
    }
}

/// Subdirectories of `dir` whose names are integers, sorted by number.
/// A missing `dir` has none.
fn numbered_dirs(
    dir: &Path,
    provider: &dyn SourceProvider,
) -> Result<Vec<(u32, PathBuf)>, ParamError> {
    let dirs = match provider.list_dirs(dir) {
        Ok(dirs) => dirs,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ParamError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut found = Vec::new();
    for path in dirs {
        if let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<u32>().ok())
        {
            found.push((id, path));
        }
    }
    found.sort_by_key(|(id, _)| *id);
    Ok(found)
}

// ──────────────────────────────────────────────
// ParameterMap
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
enum MapEntry {
    Table(ParameterTable),
    PerReco(BTreeMap<u32, ParameterTable>),
}

/// Tables supplied directly, keyed by file name. Reco-scoped files may hold
/// one table per reconstruction; a single reconstruction is used when no
/// reco id is asked for.
#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    files: HashMap<ParamFile, MapEntry>,
    scan_id: Option<u32>,
    reco_id: Option<u32>,
    study: bool,
}

impl ParameterMap {
    pub fn new() -> Self {
        ParameterMap::default()
    }

    pub fn with_table(mut self, file: ParamFile, table: ParameterTable) -> Self {
        self.files.insert(file, MapEntry::Table(table));
        self
    }

    /// Convenience for tests and callers that already hold plain values.
    pub fn with_values<K: Into<String>>(
        self,
        file: ParamFile,
        values: impl IntoIterator<Item = (K, ParsedValue)>,
    ) -> Self {
        self.with_table(file, ParameterTable::from_values(values))
    }

    pub fn with_reco_table(mut self, file: ParamFile, reco_id: u32, table: ParameterTable) -> Self {
        match self.files.get_mut(&file) {
            Some(MapEntry::PerReco(tables)) => {
                tables.insert(reco_id, table);
            }
            _ => {
                self.files
                    .insert(file, MapEntry::PerReco(BTreeMap::from([(reco_id, table)])));
            }
        }
        self
    }

    pub fn with_ids(mut self, scan_id: Option<u32>, reco_id: Option<u32>) -> Self {
        self.scan_id = scan_id;
        self.reco_id = reco_id;
        self
    }

    /// Treat the map as a study-level source.
    pub fn as_study(mut self) -> Self {
        self.study = true;
        self
    }
}

impl ParameterSource for ParameterMap {
    fn parameters(
        &self,
        file: ParamFile,
        reco_id: Option<u32>,
    ) -> Result<Option<&ParameterTable>, ParamError> {
        let table = match self.files.get(&file) {
            None => None,
            Some(MapEntry::Table(table)) => Some(table),
            Some(MapEntry::PerReco(tables)) => match reco_id {
                Some(id) => tables.get(&id),
                None if tables.len() == 1 => tables.values().next(),
                None => tables.get(&DEFAULT_RECO_ID),
            },
        };
        Ok(table)
    }

    fn is_study(&self) -> bool {
        self.study
    }

    fn scan_id(&self) -> Option<u32> {
        self.scan_id
    }

    fn reco_id(&self) -> Option<u32> {
        self.reco_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn table(text: &str) -> ParameterTable {
        ParameterTable::parse(text).unwrap_or_else(|e| panic!("parse failed: {}", e))
    }

    fn write_scan(root: &Path) -> PathBuf {
        let scan = root.join("3");
        fs::create_dir_all(scan.join("pdata/1")).unwrap();
        fs::create_dir_all(scan.join("pdata/2")).unwrap();
        fs::write(root.join("subject"), "##TITLE=subject\n##$SUBJECT_id=<rat01>\n##END=\n").unwrap();
        fs::write(scan.join("method"), "##TITLE=method\n##$Method=<RARE>\n##END=\n").unwrap();
        fs::write(scan.join("acqp"), "##TITLE=acqp\n##$NR=4\n##END=\n").unwrap();
        fs::write(scan.join("pdata/1/visu_pars"), "##$VisuCoreFrameCount=10\n").unwrap();
        fs::write(scan.join("pdata/2/visu_pars"), "##$VisuCoreFrameCount=20\n").unwrap();
        scan
    }

    #[test]
    fn scan_directory_is_read_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let scan = Scan::open(&write_scan(dir.path())).unwrap();
        assert_eq!(scan.id(), Some(3));
        assert_eq!(scan.reco_ids(), vec![1, 2]);

        let method = scan.parameters(ParamFile::Method, None).unwrap().unwrap();
        assert_eq!(method.get("Method").and_then(|v| v.as_str()), Some("RARE"));
        let subject = scan.parameters(ParamFile::Subject, None).unwrap().unwrap();
        assert_eq!(subject.get("SUBJECT_id").and_then(|v| v.as_str()), Some("rat01"));

        let frames = |reco| {
            scan.parameters(ParamFile::VisuPars, reco)
                .unwrap()
                .and_then(|t| t.get("VisuCoreFrameCount"))
                .and_then(|v| v.as_i64())
        };
        assert_eq!(frames(None), Some(10));
        assert_eq!(frames(Some(2)), Some(20));
        assert_eq!(frames(Some(9)), None);
        assert!(scan.parameters(ParamFile::Reco, None).unwrap().is_none());
    }

    #[test]
    fn malformed_parameter_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let scan_dir = write_scan(dir.path());
        fs::write(scan_dir.join("method"), "no parameters here\n").unwrap();
        let scan = Scan::open(&scan_dir).unwrap();
        let err = scan.parameters(ParamFile::Method, None).unwrap_err();
        assert!(err.is_wrong_format());
    }

    #[test]
    fn study_shares_subject_with_scans() {
        let dir = tempfile::tempdir().unwrap();
        write_scan(dir.path());
        fs::create_dir_all(dir.path().join("7")).unwrap();
        let study = Study::open(dir.path()).unwrap();
        assert!(study.is_study());
        assert_eq!(study.scan_ids(), vec![3]);
        assert!(study.parameters(ParamFile::Subject, None).unwrap().is_some());
        assert!(study.parameters(ParamFile::Method, None).unwrap().is_none());
        let scan = study.scan(3).unwrap();
        assert!(scan.parameters(ParamFile::Subject, None).unwrap().is_some());
    }

    #[test]
    fn study_reads_through_provider() {
        let provider: Rc<dyn SourceProvider> = Rc::new(
            pvmap_core::InMemoryProvider::default()
                .with_file("/study/subject", "##$SUBJECT_id=<mem01>\n")
                .with_file("/study/4/method", "##$Method=<EPI>\n")
                .with_file("/study/4/pdata/1/visu_pars", "##$VisuCoreFrameCount=30\n")
                .with_file("/study/9/notes.txt", "not a scan"),
        );
        let study = Study::open_with(Path::new("/study"), &provider).unwrap();
        assert_eq!(study.scan_ids(), vec![4]);
        let scan = study.scan(4).unwrap();
        assert_eq!(scan.reco_ids(), vec![1]);
        let method = scan.parameters(ParamFile::Method, None).unwrap().unwrap();
        assert_eq!(method.get("Method").and_then(|v| v.as_str()), Some("EPI"));
        let subject = scan.parameters(ParamFile::Subject, None).unwrap().unwrap();
        assert_eq!(subject.get("SUBJECT_id").and_then(|v| v.as_str()), Some("mem01"));
        assert!(scan.parameters(ParamFile::Acqp, None).unwrap().is_none());
    }

    #[test]
    fn in_memory_study_shares_subject() {
        let study = Study::new()
            .with_scan(Scan::new(5).with_method(table("##$Method=<FLASH>\n")))
            .with_subject(table("##$SUBJECT_id=<m1>\n"));
        let scan = study.scan(5).unwrap();
        let subject = scan.parameters(ParamFile::Subject, None).unwrap().unwrap();
        assert_eq!(subject.get("SUBJECT_id").and_then(|v| v.as_str()), Some("m1"));
    }

    #[test]
    fn scan_search_spans_files() {
        let scan = Scan::new(1)
            .with_method(table("##$PVM_EchoTime=12\n##$Method=<RARE>\n"))
            .with_reco(Reco::new(1).with_visu_pars(table("##$VisuAcqEchoTime=12\n")));
        let hits = scan.search("echotime").unwrap();
        let keys: Vec<_> = hits.iter().map(|h| (h.file, h.key.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (ParamFile::Method, "PVM_EchoTime"),
                (ParamFile::VisuPars, "VisuAcqEchoTime")
            ]
        );
        assert_eq!(hits[1].reco_id, Some(1));
    }

    #[test]
    fn parameter_map_reco_addressing() {
        let map = ParameterMap::new()
            .with_values(ParamFile::Method, [("A", ParsedValue::Int(1))])
            .with_reco_table(
                ParamFile::VisuPars,
                4,
                ParameterTable::from_values([("F", ParsedValue::Int(40))]),
            );
        assert!(map.parameters(ParamFile::Method, Some(2)).unwrap().is_some());
        let single = map.parameters(ParamFile::VisuPars, None).unwrap().unwrap();
        assert_eq!(single.get("F").and_then(|v| v.as_i64()), Some(40));
        assert!(map.parameters(ParamFile::VisuPars, Some(1)).unwrap().is_none());
        assert!(map.parameters(ParamFile::Acqp, None).unwrap().is_none());

        let two = map.with_reco_table(
            ParamFile::VisuPars,
            1,
            ParameterTable::from_values([("F", ParsedValue::Int(10))]),
        );
        let default = two.parameters(ParamFile::VisuPars, None).unwrap().unwrap();
        assert_eq!(default.get("F").and_then(|v| v.as_i64()), Some(10));
    }
}
