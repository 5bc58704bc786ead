pub(crate) mod params;
pub(crate) mod remap;
pub(crate) mod select;
pub(crate) mod validate;

use std::path::Path;

use pvmap_core::{ParamError, ParamFile};
use pvmap_eval::{ParameterSource, Scan, Study};

/// Open `dir` as a scan when it holds `method` or `acqp`, else as a study.
pub(crate) fn open_source(
    dir: &Path,
    reco: Option<u32>,
) -> Result<Box<dyn ParameterSource>, ParamError> {
    let is_scan = [ParamFile::Method, ParamFile::Acqp]
        .iter()
        .any(|f| dir.join(f.as_str()).is_file());
    if is_scan {
        let scan = Scan::open(dir)?;
        let scan = match reco {
            Some(id) => scan.select_reco(id),
            None => scan,
        };
        log::debug!("opened scan {}", dir.display());
        return Ok(Box::new(scan));
    }
    if reco.is_some() {
        log::warn!("{} is not a scan directory; --reco ignored", dir.display());
    }
    log::debug!("opened study {}", dir.display());
    Ok(Box::new(Study::open(dir)?))
}
