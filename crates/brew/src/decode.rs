use brewlet_core::{InstallEntry, Package, PackageKind, Service, Snapshot};
use brewlet_error::{BrewletError, Result};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

const UNKNOWN: &str = "Unknown";
const UNKNOWN_VERSION: &str = "?";

/// `brew services` 中表示已停止的状态
const STOPPED_STATUSES: &[&str] = &["stopped"];

// 字段缺失、为 null 或类型不符时一律取默认值，只有顶层结构不对才算解析失败。
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

// 逐条解析，跳过类型不符的元素
fn lenient_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[derive(Debug, Deserialize)]
struct RawFormula {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    desc: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    outdated: bool,
    #[serde(default, deserialize_with = "lenient")]
    revision: u32,
    #[serde(default, deserialize_with = "lenient")]
    versions: Option<RawVersions>,
    #[serde(default, deserialize_with = "lenient_vec")]
    installed: Vec<RawInstalled>,
}

#[derive(Debug, Deserialize)]
struct RawVersions {
    #[serde(default, deserialize_with = "lenient")]
    stable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInstalled {
    #[serde(default, deserialize_with = "lenient")]
    version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    installed_on_request: bool,
    #[serde(default, deserialize_with = "lenient")]
    installed_as_dependency: bool,
}

#[derive(Debug, Deserialize)]
struct RawCask {
    #[serde(default, deserialize_with = "lenient")]
    token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    desc: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    outdated: bool,
    #[serde(default, deserialize_with = "lenient")]
    version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    installed: Option<String>,
}

impl From<RawFormula> for Package {
    fn from(raw: RawFormula) -> Self {
        let installed = raw
            .installed
            .into_iter()
            .map(|entry| InstallEntry {
                version: entry.version.unwrap_or_else(|| UNKNOWN.to_string()),
                installed_on_request: entry.installed_on_request,
                installed_as_dependency: entry.installed_as_dependency,
            })
            .collect();

        Package {
            name: raw.name.unwrap_or_else(|| UNKNOWN.to_string()),
            kind: PackageKind::Formula,
            description: raw.desc,
            outdated: raw.outdated,
            revision: raw.revision,
            stable_version: raw
                .versions
                .and_then(|versions| versions.stable)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            installed,
        }
    }
}

impl From<RawCask> for Package {
    fn from(raw: RawCask) -> Self {
        // cask 只有一条安装记录，且总是用户主动安装
        let installed = vec![InstallEntry {
            version: raw.installed.unwrap_or_else(|| UNKNOWN.to_string()),
            installed_on_request: true,
            installed_as_dependency: false,
        }];

        Package {
            name: raw.token.unwrap_or_else(|| UNKNOWN.to_string()),
            kind: PackageKind::Cask,
            description: raw.desc,
            outdated: raw.outdated,
            revision: 0,
            stable_version: raw.version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            installed,
        }
    }
}

fn decode_elements<R>(context: &str, elements: Vec<Value>, packages: &mut Vec<Package>)
where
    R: DeserializeOwned + Into<Package>,
{
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<R>(element) {
            Ok(raw) => packages.push(raw.into()),
            Err(err) => warn!("跳过无法解析的 {} 条目 #{}: {}", context, index, err),
        }
    }
}

fn take_array(object: &mut serde_json::Map<String, Value>, key: &str) -> Result<Vec<Value>> {
    match object.remove(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(BrewletError::parse(
            "brew info",
            format!("\"{}\" 不是数组", key),
        )),
    }
}

/// 同时支持 `--json=v2` 的 formulae/casks 对象与旧版扁平数组
pub fn decode_packages(bytes: &[u8]) -> Result<Snapshot> {
    let data: Value =
        serde_json::from_slice(bytes).map_err(|e| BrewletError::parse("brew info", e))?;

    let mut packages = Vec::new();
    match data {
        Value::Array(elements) => {
            decode_elements::<RawFormula>("formula", elements, &mut packages);
        }
        Value::Object(mut object) => {
            if !object.contains_key("formulae") && !object.contains_key("casks") {
                return Err(BrewletError::parse(
                    "brew info",
                    "缺少 formulae 或 casks 字段",
                ));
            }
            let formulae = take_array(&mut object, "formulae")?;
            let casks = take_array(&mut object, "casks")?;
            decode_elements::<RawFormula>("formula", formulae, &mut packages);
            decode_elements::<RawCask>("cask", casks, &mut packages);
        }
        _ => {
            return Err(BrewletError::parse(
                "brew info",
                "顶层既不是数组也不是对象",
            ))
        }
    }

    debug!("解析到 {} 个已安装包", packages.len());
    Ok(Snapshot::new(packages))
}

/// 第一行是表头；每行第一列为服务名，第二列为状态
pub fn decode_services(text: &str) -> Vec<Service> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let status = parts.next().unwrap_or_default();
            Some(Service {
                name: name.to_string(),
                stopped: STOPPED_STATUSES.contains(&status),
            })
        })
        .collect()
}

/// `analytics state` 输出包含 disabled 时视为关闭
pub fn decode_analytics_state(text: &str) -> bool {
    !text.to_lowercase().contains("disabled")
}

/// 旧版 `outdated` 每行一个包
pub fn decode_outdated_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn decode_summary(text: &str) -> String {
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const V2_PAYLOAD: &str = r#"{
      "formulae": [
        {
          "name": "fzf",
          "desc": "Command-line fuzzy finder",
          "outdated": true,
          "revision": 1,
          "versions": {"stable": "0.54.0"},
          "installed": [
            {"version": "0.53.0", "installed_on_request": true, "installed_as_dependency": false}
          ]
        },
        {
          "name": "libyaml",
          "desc": null,
          "outdated": false,
          "versions": {"stable": "0.2.5"},
          "installed": [
            {"version": "0.2.5", "installed_on_request": false, "installed_as_dependency": true},
            {"version": "0.2.4", "installed_on_request": true, "installed_as_dependency": false}
          ]
        }
      ],
      "casks": [
        {
          "token": "firefox",
          "name": ["Mozilla Firefox"],
          "desc": "Web browser",
          "version": "129.0",
          "installed": "128.0",
          "outdated": true
        }
      ]
    }"#;

    #[test]
    fn test_decode_current_schema() {
        let snapshot = decode_packages(V2_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(snapshot.len(), 3);

        let fzf = &snapshot.packages()[0];
        assert_eq!(fzf.name, "fzf");
        assert_eq!(fzf.revision, 1);
        assert_eq!(fzf.stable_version, "0.54.0");
        assert_eq!(fzf.installed_version(), Some("0.53.0"));
        assert!(fzf.installed_on_request());

        let libyaml = &snapshot.packages()[1];
        assert_eq!(libyaml.description, None);
        assert_eq!(libyaml.installed.len(), 2);
        assert!(libyaml.installed_on_request());
    }

    #[test]
    fn test_cask_has_single_requested_entry() {
        let snapshot = decode_packages(V2_PAYLOAD.as_bytes()).unwrap();
        let firefox = &snapshot.packages()[2];

        assert_eq!(firefox.kind, PackageKind::Cask);
        assert_eq!(firefox.stable_version, "129.0");
        assert_eq!(
            firefox.installed,
            vec![InstallEntry {
                version: "128.0".to_string(),
                installed_on_request: true,
                installed_as_dependency: false,
            }]
        );
    }

    #[test]
    fn test_decode_legacy_schema() {
        let payload = r#"[
          {"name": "vim", "outdated": true, "versions": {"stable": "9.1"},
           "installed": [{"version": "9.0", "installed_on_request": true}]}
        ]"#;
        let snapshot = decode_packages(payload.as_bytes()).unwrap();
        assert_eq!(snapshot.len(), 1);

        let vim = &snapshot.packages()[0];
        assert!(vim.outdated);
        assert!(!vim.installed[0].installed_as_dependency);
    }

    #[test]
    fn test_missing_fields_default() {
        let payload = r#"{"formulae": [{"name": "wget"}], "casks": []}"#;
        let snapshot = decode_packages(payload.as_bytes()).unwrap();
        let wget = &snapshot.packages()[0];

        assert_eq!(wget.description, None);
        assert!(!wget.outdated);
        assert_eq!(wget.revision, 0);
        assert_eq!(wget.stable_version, "?");
        assert_eq!(wget.installed_version(), None);
    }

    #[test]
    fn test_null_fields_default() {
        let payload = r#"[{"name": "node", "outdated": null, "revision": null, "installed": null}]"#;
        let snapshot = decode_packages(payload.as_bytes()).unwrap();
        let node = &snapshot.packages()[0];

        assert!(!node.outdated);
        assert_eq!(node.revision, 0);
        assert!(node.installed.is_empty());
    }

    #[test]
    fn test_mistyped_fields_default() {
        let payload = r#"{
          "formulae": [
            {
              "name": "vim",
              "desc": 42,
              "outdated": true,
              "revision": "2",
              "versions": "9.1",
              "installed": [
                "9.0",
                {"version": 9, "installed_on_request": "yes", "installed_as_dependency": false},
                {"version": "9.0.1", "installed_on_request": true}
              ]
            }
          ],
          "casks": [{"token": "firefox", "desc": ["Web browser"], "outdated": 1, "installed": false}]
        }"#;
        let snapshot = decode_packages(payload.as_bytes()).unwrap();
        assert_eq!(snapshot.len(), 2);

        let vim = &snapshot.packages()[0];
        assert_eq!(vim.name, "vim");
        assert!(vim.outdated);
        assert_eq!(vim.description, None);
        assert_eq!(vim.revision, 0);
        assert_eq!(vim.stable_version, "?");
        assert_eq!(vim.installed.len(), 2);
        assert_eq!(vim.installed_version(), Some("Unknown"));
        assert!(!vim.installed[0].installed_on_request);
        assert!(vim.installed_on_request());

        let firefox = &snapshot.packages()[1];
        assert_eq!(firefox.name, "firefox");
        assert_eq!(firefox.description, None);
        assert!(!firefox.outdated);
        assert_eq!(firefox.installed_version(), Some("Unknown"));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = decode_packages(b"Error: No such keg").unwrap_err();
        assert!(matches!(err, BrewletError::Parse { .. }));
    }

    #[test]
    fn test_wrong_top_level_shape() {
        assert!(decode_packages(b"42").is_err());
        assert!(decode_packages(br#"{"packages": []}"#).is_err());
        assert!(decode_packages(br#"{"formulae": "fzf"}"#).is_err());
    }

    #[test]
    fn test_decode_services() {
        let services = decode_services("Name Status\npostgres started\nredis stopped\n");
        assert_eq!(
            services,
            vec![
                Service {
                    name: "postgres".to_string(),
                    stopped: false,
                },
                Service {
                    name: "redis".to_string(),
                    stopped: true,
                },
            ]
        );
    }

    #[test]
    fn test_decode_services_header_only() {
        assert!(decode_services("Name Status User File\n").is_empty());
        assert!(decode_services("").is_empty());
    }

    #[test]
    fn test_decode_services_status_is_case_sensitive() {
        let services = decode_services("Name Status\nredis Stopped\nmysql\n");
        assert!(!services[0].stopped);
        assert!(!services[1].stopped);
    }

    #[test]
    fn test_decode_analytics_state() {
        assert!(!decode_analytics_state(
            "InfluxDB analytics are disabled.\nGoogle Analytics were destroyed."
        ));
        assert!(decode_analytics_state("Analytics are enabled."));
        assert!(!decode_analytics_state("Analytics are DISABLED"));
    }

    #[test]
    fn test_decode_outdated_lines() {
        let lines = decode_outdated_lines("fzf (0.53.0) < 0.54.0\n\nvim (9.0) < 9.1\n");
        assert_eq!(lines, vec!["fzf (0.53.0) < 0.54.0", "vim (9.0) < 9.1"]);
        assert!(decode_outdated_lines("").is_empty());
    }
}
