use ort::{GraphOptimizationLevel, Session};
use std::path::Path;

pub fn create_session(model_path: &Path) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .with_inter_threads(1)?
        .commit_from_file(model_path)?;
    Ok(session)
}
