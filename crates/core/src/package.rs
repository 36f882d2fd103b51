use serde::{Deserialize, Serialize};

/// 一次安装记录，解码后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallEntry {
    pub version: String,
    pub installed_on_request: bool,
    pub installed_as_dependency: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PackageKind {
    Formula,
    Cask,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub name: String,
    pub kind: PackageKind,
    pub description: Option<String>,
    pub outdated: bool,
    pub revision: u32,
    pub stable_version: String,
    /// 按 brew 的约定最新的安装记录在最前
    pub installed: Vec<InstallEntry>,
}

impl Package {
    /// 任意一条安装记录是用户主动安装的
    pub fn installed_on_request(&self) -> bool {
        self.installed.iter().any(|entry| entry.installed_on_request)
    }

    /// 第一条安装记录的版本；未安装时为 None
    pub fn installed_version(&self) -> Option<&str> {
        self.installed.first().map(|entry| entry.version.as_str())
    }

    /// 已安装版本与 stable 版本不一致
    pub fn has_update(&self) -> bool {
        match self.installed_version() {
            Some(version) => version != self.stable_version,
            None => false,
        }
    }
}

/// 一次轮询得到的全部已安装包
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    packages: Vec<Package>,
}

impl Snapshot {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn outdated<'a>(&'a self, policy: &'a InclusionPolicy) -> impl Iterator<Item = &'a Package> {
        self.packages.iter().filter(move |pkg| policy.counts_as_outdated(pkg))
    }

    pub fn outdated_count(&self, policy: &InclusionPolicy) -> usize {
        self.outdated(policy).count()
    }
}

impl From<Vec<Package>> for Snapshot {
    fn from(packages: Vec<Package>) -> Self {
        Self::new(packages)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InclusionPolicy {
    pub include_dependencies: bool,
}

impl InclusionPolicy {
    pub fn new(include_dependencies: bool) -> Self {
        Self {
            include_dependencies,
        }
    }

    pub fn counts_as_outdated(&self, package: &Package) -> bool {
        if !package.outdated {
            return false;
        }
        self.include_dependencies || package.installed_on_request()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub stopped: bool,
}
