use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use plutus_adapters::SourceLocator;
use serde::Deserialize;

/// Source registry loaded from `sources.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub leads: Option<LeadsSection>,
    #[serde(default)]
    pub transactions: Option<SingleSource>,
    #[serde(default)]
    pub assignments: Option<SingleSource>,
    #[serde(default)]
    pub webinar: Option<SingleSource>,
    /// Relative `file` locators resolve against this directory.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadsSection {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub sheets: Vec<SheetSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetSource {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub locator: LocatorSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SingleSource {
    #[serde(default)]
    pub table: Option<String>,
    pub name: String,
    pub locator: LocatorSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorSpec {
    Sheet {
        sheet_id: String,
        tab: String,
    },
    Csv {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    File {
        path: String,
    },
}

fn default_enabled() -> bool {
    true
}

impl SourceRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut registry = Self::from_yaml_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        registry.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(registry)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

impl LocatorSpec {
    /// Expand `${VAR}` references and resolve it to a concrete locator.
    pub fn resolve(
        &self,
        lookup: &dyn Fn(&str) -> Option<String>,
        base_dir: &Path,
    ) -> Result<SourceLocator> {
        Ok(match self {
            Self::Sheet { sheet_id, tab } => {
                let sheet_id = expand_vars(sheet_id, lookup)?;
                let tab = expand_vars(tab, lookup)?;
                if sheet_id.trim().is_empty() || tab.trim().is_empty() {
                    bail!("sheet locator needs both sheet_id and tab");
                }
                SourceLocator::Sheet { sheet_id, tab }
            }
            Self::Csv { url, api_key } => {
                let url = expand_vars(url, lookup)?;
                if url.trim().is_empty() {
                    bail!("csv locator needs a url");
                }
                let api_key = match api_key {
                    Some(key) => Some(expand_vars(key, lookup)?).filter(|k| !k.is_empty()),
                    None => None,
                };
                SourceLocator::Csv { url, api_key }
            }
            Self::File { path } => {
                let path = PathBuf::from(expand_vars(path, lookup)?);
                let path = if path.is_relative() {
                    base_dir.join(path)
                } else {
                    path
                };
                SourceLocator::File { path }
            }
        })
    }

    /// Tab name for sheet locators, used by the `--sheet` filter.
    pub fn tab(&self) -> Option<&str> {
        match self {
            Self::Sheet { tab, .. } => Some(tab),
            _ => None,
        }
    }
}

/// Expand `${VAR}` and `${VAR:-default}`. An unset variable without a default is an error.
pub fn expand_vars(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            bail!("unterminated variable reference in {text:?}");
        };
        let expr = &after[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };
        let value = lookup(name.trim()).filter(|v| !v.is_empty());
        match (value, default) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(default)) => out.push_str(default),
            (None, None) => bail!("environment variable {} is not set", name.trim()),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
leads:
  table: tofu_leads
  sheets:
    - name: Sheet1
      locator: { kind: sheet, sheet_id: "${SHEET_1_ID}", tab: "${SHEET_1_TAB:-Leads}" }
    - name: ACCA
      enabled: false
      locator: { kind: sheet, sheet_id: "${SHEET_2_ID}", tab: Form }
transactions:
  name: bofu-api
  locator: { kind: csv, url: "${BOFU_API_URL}", api_key: "${BOFU_API_KEY:-}" }
assignments:
  name: mofu-api
  locator: { kind: file, path: exports/mofu.csv }
"#;

    fn lookup<'a>(vars: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn registry_parses_every_locator_kind() {
        let registry = SourceRegistry::from_yaml_str(YAML).expect("yaml");
        let leads = registry.leads.expect("leads");
        assert_eq!(leads.sheets.len(), 2);
        assert!(leads.sheets[0].enabled);
        assert!(!leads.sheets[1].enabled);
        assert!(registry.webinar.is_none());
        assert!(matches!(
            registry.assignments.expect("mofu").locator,
            LocatorSpec::File { .. }
        ));
    }

    #[test]
    fn production_registry_lists_the_lead_sheets() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../sources.yaml");
        let registry = SourceRegistry::load(&path).expect("sources.yaml");
        let leads = registry.leads.expect("leads");
        let enabled: Vec<&str> = leads
            .sheets
            .iter()
            .filter(|sheet| sheet.enabled)
            .map(|sheet| sheet.name.as_str())
            .collect();
        assert_eq!(enabled, ["Sheet1", "ACCA", "Bootcamp_30_March"]);

        let vars = HashMap::from([("SHEET_3_ID", "sheet-three")]);
        let bootcamp = leads.sheets[2]
            .locator
            .resolve(&lookup(&vars), Path::new("."))
            .expect("resolve");
        assert_eq!(
            bootcamp,
            SourceLocator::Sheet {
                sheet_id: "sheet-three".into(),
                tab: "Bootcamp_30_March".into()
            }
        );
    }

    #[test]
    fn variables_expand_with_defaults() {
        let vars = HashMap::from([("SHEET_1_ID", "abc"), ("BOFU_API_URL", "https://api.example.com/x")]);
        let registry = SourceRegistry::from_yaml_str(YAML).expect("yaml");
        let leads = registry.leads.expect("leads");
        let sheet = leads.sheets[0]
            .locator
            .resolve(&lookup(&vars), Path::new("."))
            .expect("resolve");
        assert_eq!(
            sheet,
            SourceLocator::Sheet {
                sheet_id: "abc".into(),
                tab: "Leads".into()
            }
        );
        let csv = registry
            .transactions
            .expect("bofu")
            .locator
            .resolve(&lookup(&vars), Path::new("."))
            .expect("resolve");
        assert_eq!(
            csv,
            SourceLocator::Csv {
                url: "https://api.example.com/x".into(),
                api_key: None
            }
        );
    }

    #[test]
    fn unset_variables_fail_resolution() {
        let vars = HashMap::new();
        let err = expand_vars("${SHEET_2_ID}", &lookup(&vars)).expect_err("unset");
        assert!(err.to_string().contains("SHEET_2_ID"));
        assert!(expand_vars("${OPEN", &lookup(&vars)).is_err());
        assert_eq!(expand_vars("plain", &lookup(&vars)).expect("plain"), "plain");
    }

    #[test]
    fn relative_file_paths_join_base_dir() {
        let spec = LocatorSpec::File {
            path: "leads/sample.csv".into(),
        };
        let vars = HashMap::new();
        let locator = spec.resolve(&lookup(&vars), Path::new("/srv/fixtures")).expect("resolve");
        assert_eq!(
            locator,
            SourceLocator::File {
                path: PathBuf::from("/srv/fixtures/leads/sample.csv")
            }
        );
    }
}
