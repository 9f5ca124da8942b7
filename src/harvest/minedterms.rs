//! Per-semantic-type CSV summary of downloaded text-mined terms.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::HarvestError;
use crate::models::AssetKind;
use crate::utils::sanitize_path_component;

/// Directory the summary CSV files are written to
pub const SUMMARY_DIR: &str = "minedterms_summary";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinedTerms {
    request: TermsRequest,
    semantic_type_list: SemanticTypeList,
}

#[derive(Debug, Deserialize)]
struct TermsRequest {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemanticTypeList {
    #[serde(default)]
    semantic_type: Vec<SemanticType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemanticType {
    name: String,
    #[serde(default)]
    tm_summary: Vec<TermSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermSummary {
    term: String,
    #[serde(default)]
    count: u64,
    #[serde(default, alias = "dbname")]
    db_name: Option<String>,
    #[serde(default)]
    db_id_list: Option<DbIdList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbIdList {
    #[serde(default)]
    db_id: Vec<String>,
}

type Row = [String; 5];

/// Summarize every `*/textMinedTerms.json` under `output_dir` into one CSV
/// per semantic type. Returns the files written.
pub async fn summarise_mined_terms(output_dir: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    let summary_dir = output_dir.join(SUMMARY_DIR);
    info!("Writing mined term summary CSV files to {}/", SUMMARY_DIR);
    tokio::fs::create_dir_all(&summary_dir).await?;

    let filename = AssetKind::MinedTerms.default_filename();
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path().join(filename);
        if entry.file_type().await?.is_dir() && tokio::fs::try_exists(&path).await? {
            files.push(path);
        }
    }
    files.sort();

    let mut store: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for path in &files {
        let terms = match read_terms(path).await {
            Ok(terms) => terms,
            Err(reason) => {
                warn!("Skipping {}: {}", path.display(), reason);
                continue;
            }
        };
        for semantic_type in terms.semantic_type_list.semantic_type {
            let rows = store.entry(semantic_type.name).or_default();
            rows.extend(semantic_type.tm_summary.into_iter().map(|term| {
                [
                    terms.request.id.clone(),
                    term.term,
                    term.count.to_string(),
                    term.db_name.unwrap_or_default(),
                    term.db_id_list.unwrap_or_default().db_id.join(";"),
                ]
            }));
        }
    }

    let mut written = Vec::with_capacity(store.len());
    for (name, rows) in store {
        let path = summary_dir.join(format!("{}.csv", sanitize_path_component(&name)));
        let body = to_csv(&name, &rows)?;
        tokio::fs::write(&path, body).await?;
        debug!("Wrote {} rows to {}", rows.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

async fn read_terms(path: &Path) -> Result<MinedTerms, String> {
    let body = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&body).map_err(|e| e.to_string())
}

fn to_csv(name: &str, rows: &[Row]) -> Result<Vec<u8>, HarvestError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["article", name, "count", "dbName", "dbId"])?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| HarvestError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_terms(root: &Path, article: &str, body: &serde_json::Value) {
        let dir = root.join(article);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("textMinedTerms.json"), body.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_summary_groups_by_semantic_type() {
        let dir = tempfile::tempdir().unwrap();
        write_terms(
            dir.path(),
            "PMC1",
            &json!({
                "request": {"id": "PMC1"},
                "semanticTypeList": {"semanticType": [
                    {"name": "Gene_Proteins", "tmSummary": [
                        {"term": "p53", "count": 4, "dbName": "UNIPROT",
                         "dbIdList": {"dbId": ["P04637", "Q1"]}}
                    ]},
                    {"name": "Diseases", "tmSummary": [
                        {"term": "cancer, lung", "count": 2, "dbname": "OMIM",
                         "dbIdList": {"dbId": ["211980"]}}
                    ]}
                ]}
            }),
        );
        write_terms(
            dir.path(),
            "PMC2",
            &json!({
                "request": {"id": "PMC2"},
                "semanticTypeList": {"semanticType": [
                    {"name": "Gene_Proteins", "tmSummary": [
                        {"term": "BRCA1", "count": 1}
                    ]}
                ]}
            }),
        );
        write_terms(dir.path(), "PMC3", &json!({"not": "terms"}));

        let written = summarise_mined_terms(dir.path()).await.unwrap();
        assert_eq!(written.len(), 2);

        let genes =
            std::fs::read_to_string(dir.path().join(SUMMARY_DIR).join("Gene_Proteins.csv"))
                .unwrap();
        assert_eq!(
            genes,
            "article,Gene_Proteins,count,dbName,dbId\nPMC1,p53,4,UNIPROT,P04637;Q1\nPMC2,BRCA1,1,,\n"
        );

        let diseases =
            std::fs::read_to_string(dir.path().join(SUMMARY_DIR).join("Diseases.csv")).unwrap();
        assert_eq!(
            diseases,
            "article,Diseases,count,dbName,dbId\nPMC1,\"cancer, lung\",2,OMIM,211980\n"
        );
    }

    #[tokio::test]
    async fn test_summary_without_terms_files() {
        let dir = tempfile::tempdir().unwrap();
        let written = summarise_mined_terms(dir.path()).await.unwrap();
        assert!(written.is_empty());
        assert!(dir.path().join(SUMMARY_DIR).is_dir());
    }
}
