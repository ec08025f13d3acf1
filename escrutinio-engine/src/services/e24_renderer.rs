//! E-24 artifact rendering
//!
//! Materialises a consolidation's current totals into a labelled
//! field/value document stored under the artifacts directory. The
//! artifact embeds the consolidation id and the totals current at
//! render time plus a content hash; downstream the core treats it as an
//! opaque blob (only *official* E-24s are ever parsed back).

use crate::models::Consolidation;
use escrutinio_common::{time, Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Render the artifact, atomically (temp file + rename), and return its
/// path. A rendering failure leaves no partial file behind.
pub fn render_artifact(
    consolidation: &Consolidation,
    municipality_name: &str,
    election_type_name: &str,
    artifacts_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(artifacts_dir)?;

    let body = render_body(consolidation, municipality_name, election_type_name);
    let hash = Sha256::digest(body.as_bytes());
    let content = format!("{}SHA-256: {:x}\n", body, hash);

    let stamp = time::compact_stamp(time::now());
    let filename = format!(
        "E24_{}_{}_{}.txt",
        sanitize(municipality_name),
        sanitize(election_type_name),
        stamp
    );
    let final_path = artifacts_dir.join(&filename);
    let temp_path = artifacts_dir.join(format!(".{}.{}", filename, uuid::Uuid::new_v4()));

    std::fs::write(&temp_path, &content)?;
    std::fs::rename(&temp_path, &final_path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        Error::Io(e)
    })?;

    tracing::info!(
        consolidation_id = consolidation.id,
        artifact = %final_path.display(),
        "E-24 artifact rendered"
    );

    Ok(final_path)
}

/// Field labels here must stay recognisable by the E-24 field parser,
/// since official documents follow the same layout.
fn render_body(
    consolidation: &Consolidation,
    municipality_name: &str,
    election_type_name: &str,
) -> String {
    format!(
        "FORMULARIO E-24\n\
         Consolidación: {}\n\
         Municipio: {}\n\
         Tipo de elección: {}\n\
         Mesas procesadas: {}\n\
         Mesas esperadas: {}\n\
         Votos válidos: {}\n\
         Votos en blanco: {}\n\
         Votos nulos: {}\n\
         Tarjetas no marcadas: {}\n\
         Total tarjetones: {}\n\
         Generado: {}\n",
        consolidation.id,
        municipality_name,
        election_type_name,
        consolidation.tables_processed,
        consolidation.total_tables_expected,
        consolidation.total_valid_votes,
        consolidation.total_blank_votes,
        consolidation.total_null_votes,
        consolidation.total_unmarked,
        consolidation.total_ballots,
        time::now_iso(),
    )
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
