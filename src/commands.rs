use std::path::Path;

use crate::settings::Settings;

/// Argument vectors for the tools the pipeline drives.
///
/// Outside a hosted demo environment every vector starts with
/// `conda run --no-capture-output --prefix <env>`, so the tool runs inside
/// the project's isolated environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Commands {
    pub run_in: Vec<String>,
    pub python_m: Vec<String>,
    pub pip: Vec<String>,
    pub setup_editable: Vec<String>,
    pub yarn: Vec<String>,
    pub npm: Vec<String>,
    pub prettier: Vec<String>,
    pub lab: Vec<String>,
}

impl Commands {
    pub fn new(settings: &Settings) -> Self {
        let run_in = if settings.binder {
            Vec::new()
        } else {
            vec![
                "conda".to_string(),
                "run".to_string(),
                "--no-capture-output".to_string(),
                "--prefix".to_string(),
                path_arg(&settings.env.prefix),
            ]
        };

        let wrap = |args: &[&str]| -> Vec<String> {
            run_in
                .iter()
                .cloned()
                .chain(args.iter().map(|a| a.to_string()))
                .collect()
        };

        let python_m = wrap(&["python", "-m"]);
        let pip = extend(&python_m, &["pip"]);
        let setup_editable = extend(
            &pip,
            &["install", "-e", ".", "-vvv", "--no-deps", "--ignore-installed"],
        );
        let lab = extend(
            &python_m,
            &["jupyter", "lab", "--debug", "--no-browser", "--autoreload"],
        );

        let mut prettier = wrap(&["node"]);
        prettier.push(path_arg(&settings.lab.prettier_bin));

        Commands {
            yarn: wrap(&["yarn", "--silent"]),
            npm: wrap(&["npm"]),
            run_in,
            python_m,
            pip,
            setup_editable,
            prettier,
            lab,
        }
    }

    /// `run_in` followed by `args`.
    pub fn wrap<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        extend(&self.run_in, args)
    }

    /// Every tool vector, by name.
    #[cfg(test)]
    fn all(&self) -> [(&'static str, &[String]); 7] {
        [
            ("python_m", self.python_m.as_slice()),
            ("pip", self.pip.as_slice()),
            ("setup_editable", self.setup_editable.as_slice()),
            ("yarn", self.yarn.as_slice()),
            ("npm", self.npm.as_slice()),
            ("prettier", self.prettier.as_slice()),
            ("lab", self.lab.as_slice()),
        ]
    }
}

/// `base` followed by `args`.
pub fn extend<S: AsRef<str>>(base: &[String], args: &[S]) -> Vec<String> {
    base.iter()
        .cloned()
        .chain(args.iter().map(|a| a.as_ref().to_string()))
        .collect()
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn every_vector_is_wrapped_outside_binder() {
        let dir = tempdir().unwrap();
        let settings = Settings::new(dir.path(), false, None).unwrap();
        let commands = Commands::new(&settings);

        assert_eq!(commands.run_in[..3], ["conda", "run", "--no-capture-output"]);
        assert_eq!(commands.run_in[4], path_arg(&dir.path().join(".env")));
        for (name, argv) in commands.all() {
            assert!(argv.starts_with(&commands.run_in), "{name} is not wrapped");
            assert!(argv.len() > commands.run_in.len(), "{name} has no tool");
        }
    }

    #[test]
    fn binder_drops_the_activation_prefix() {
        let dir = tempdir().unwrap();
        let settings = Settings::new(dir.path(), true, None).unwrap();
        let commands = Commands::new(&settings);

        assert!(commands.run_in.is_empty());
        for (name, argv) in commands.all() {
            assert_ne!(argv[0], "conda", "{name} is still wrapped");
        }
        assert_eq!(commands.yarn, ["yarn", "--silent"]);
        assert_eq!(commands.pip, ["python", "-m", "pip"]);
    }
}
