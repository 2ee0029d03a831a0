//! Every filesystem location the pipeline touches, resolved once at startup.
//!
//! [`Settings`] is built from the project root and a handful of environment
//! variables and is never mutated afterwards. Task constructors borrow it.

use std::{
    env,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{
    error::{DodoError, Result},
    fingerprint::{dedup_paths, glob_files},
};

/// JSON boolean-ish switch for running inside a hosted demo (binder)
/// environment, where tools are already on `PATH`.
pub const BINDER_ENV_VAR: &str = "LAB_LICENSES_BINDER";

/// Variables forwarded to every child process.
pub const CHILD_ENV: &[(&str, &str)] = &[
    ("NODE_OPTS", "--max-old-space-size=4096"),
    ("PYTHONIOENCODING", "utf-8"),
    ("PIP_DISABLE_PIP_VERSION_CHECK", "1"),
    ("MAMBA_NO_BANNER", "1"),
];

const BUILDER_TGZ_NAME: &str = "jupyterlab-builder-3.1.0-alpha.3.tgz";

const SERVER_LINT_SOURCES: &[&str] = &[
    "jupyterlab_server/licenses_handler.py",
    "jupyterlab_server/licenses_app.py",
    "jupyterlab_server/tests/test_licenses_api.py",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub binder: bool,
    pub home: Option<PathBuf>,
    pub readme: PathBuf,
    pub env: EnvPaths,
    pub lab: LabPaths,
    pub server: ServerPaths,
}

/// The isolated conda environment and the lab application directory inside it.
#[derive(Debug, Clone)]
pub struct EnvPaths {
    pub yaml: PathBuf,
    pub prefix: PathBuf,
    pub history: PathBuf,
    pub app_dir: PathBuf,
    pub app_staging: PathBuf,
    pub app_static: PathBuf,
    pub pip_check_ok: PathBuf,
    pub server_ext_ok: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LabPaths {
    pub root: PathBuf,
    pub node_modules: PathBuf,
    pub yarn_integrity: PathBuf,
    pub prettier_bin: PathBuf,
    pub packages: PathBuf,
    pub build: PathBuf,
    pub builder: PathBuf,
    pub buildutils: PathBuf,
    pub testutils: PathBuf,
    pub dev_mode: PathBuf,
    pub dev_static: PathBuf,
    pub dev_static_package: PathBuf,
    pub dev_static_licenses: PathBuf,
    pub buildutils_tsbuildinfo: PathBuf,
    pub builder_tsbuildinfo: PathBuf,
    pub meta_tsbuildinfo: PathBuf,
    pub builder_tgz: PathBuf,
    pub integrity_ok: PathBuf,
    pub all_buildutils: Vec<PathBuf>,
    pub all_ts_src: Vec<PathBuf>,
    pub packages_json: Vec<PathBuf>,
    pub dev_mode_sources: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerPaths {
    pub root: PathBuf,
    pub lint_sources: Vec<PathBuf>,
}

impl Settings {
    /// Resolve settings for `root` from the process environment.
    pub fn from_env(root: impl Into<PathBuf>) -> Result<Self> {
        let binder = parse_binder_flag(env::var(BINDER_ENV_VAR).ok().as_deref())?;
        let home = dirs::home_dir();
        Settings::new(root, binder, home)
    }

    pub fn new(root: impl Into<PathBuf>, binder: bool, home: Option<PathBuf>) -> Result<Self> {
        let root = root.into();
        let env = EnvPaths::new(&root);
        let lab = LabPaths::new(&root)?;
        let server = ServerPaths::new(&root);

        Ok(Settings {
            readme: root.join("README.md"),
            root,
            binder,
            home,
            env,
            lab,
            server,
        })
    }

    pub fn child_env(&self) -> Vec<(String, String)> {
        CHILD_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// The global yarn cache, removed by `clean_all`.
    pub fn yarn_cache(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|home| home.join(".yarn"))
    }
}

impl EnvPaths {
    fn new(root: &Path) -> Self {
        let prefix = root.join(".env");
        let app_dir = prefix.join("share/jupyter/lab");

        EnvPaths {
            yaml: root.join("environment.yml"),
            history: prefix.join("conda-meta/history"),
            app_staging: app_dir.join("staging"),
            app_static: app_dir.join("static"),
            pip_check_ok: prefix.join(".pip-check.ok"),
            server_ext_ok: prefix.join(".server-ext.ok"),
            app_dir,
            prefix,
        }
    }
}

impl LabPaths {
    fn new(root: &Path) -> Result<Self> {
        let lab = root.join("jupyterlab");
        let node_modules = lab.join("node_modules");
        let yarn_integrity = node_modules.join(".yarn-integrity");
        let packages = lab.join("packages");
        let builder = lab.join("builder");
        let buildutils = lab.join("buildutils");
        let testutils = lab.join("testutils");
        let build = lab.join("build");
        let dev_mode = lab.join("dev_mode");
        let dev_static = dev_mode.join("static");

        let mut all_buildutils = Vec::new();
        all_buildutils.extend(glob_files(&builder, "src/**/*.ts")?);
        all_buildutils.extend(glob_files(&builder, "*.json")?);
        all_buildutils.extend(glob_files(&buildutils, "*.json")?);
        all_buildutils.extend(glob_files(&buildutils, "**/src/**/*")?);
        all_buildutils.extend(glob_files(&buildutils, "**/template/**/*")?);
        all_buildutils.push(yarn_integrity.clone());

        let mut packages_json = glob_files(&packages, "*/package.json")?;
        packages_json.push(builder.join("package.json"));
        packages_json.push(lab.join("package.json"));
        packages_json.push(testutils.join("package.json"));

        Ok(LabPaths {
            prettier_bin: node_modules.join(".bin/prettier"),
            all_buildutils: dedup_paths(all_buildutils),
            all_ts_src: glob_files(&packages, "**/src/**/*.ts*")?,
            packages_json: dedup_paths(packages_json),
            dev_mode_sources: glob_files(&dev_mode, "*.js*")?,
            buildutils_tsbuildinfo: buildutils.join("tsconfig.tsbuildinfo"),
            builder_tsbuildinfo: builder.join("tsconfig.tsbuildinfo"),
            meta_tsbuildinfo: packages.join("metapackage/tsconfig.tsbuildinfo"),
            builder_tgz: builder.join(BUILDER_TGZ_NAME),
            integrity_ok: build.join("repo.integrity.log"),
            dev_static_package: dev_static.join("package.json"),
            dev_static_licenses: dev_static.join("third-party-licenses.json"),
            root: lab,
            node_modules,
            yarn_integrity,
            packages,
            build,
            builder,
            buildutils,
            testutils,
            dev_mode,
            dev_static,
        })
    }
}

impl ServerPaths {
    fn new(root: &Path) -> Self {
        ServerPaths {
            lint_sources: SERVER_LINT_SOURCES.iter().map(|p| root.join(p)).collect(),
            root: root.join("jupyterlab_server"),
        }
    }
}

/// Interpret the hosted-demo switch as JSON, with Python-style truthiness.
///
/// An unset variable means "off"; a value that is not JSON is an error.
pub fn parse_binder_flag(raw: Option<&str>) -> Result<bool> {
    let Some(raw) = raw else {
        return Ok(false);
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| {
        DodoError::Config(format!(
            "{} must be a JSON value such as 0, 1, true or false, got '{}': {}",
            BINDER_ENV_VAR, raw, e
        ))
    })?;

    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    })
}
