//! Declarations of the lab/licenses development pipeline.
//!
//! Each `register_*` function adds one family of tasks to the registry. All
//! of them read paths from [`Settings`] and tool invocations from
//! [`Commands`]; none of them touch the filesystem.

use crate::{
    action::Action,
    commands::{Commands, extend, path_arg},
    error::Result,
    settings::Settings,
    task::{Task, TaskGraph, TaskRegistry},
};

pub const DEFAULT_TASKS: &[&str] = &["binder"];

const DEV_MODE_ARGS: &[&str] = &["--dev-mode", "--ServerApp.base_url", "/dev-mode/"];

/// Build and validate the full task graph.
pub fn build_graph(settings: &Settings, commands: &Commands) -> Result<TaskGraph> {
    let mut registry = TaskRegistry::new();

    register_binder(&mut registry, settings)?;
    register_env(&mut registry, settings)?;
    register_setup(&mut registry, settings, commands)?;
    register_lint(&mut registry, settings, commands)?;
    register_integrity(&mut registry, settings, commands)?;
    register_build(&mut registry, settings, commands)?;
    register_test(&mut registry, commands)?;
    register_dev_mode(&mut registry, commands)?;
    register_clean_all(&mut registry, settings)?;
    register_patched_prod(&mut registry, settings, commands)?;

    registry.set_default_tasks(DEFAULT_TASKS.iter().copied());
    registry.build()
}

fn register_binder(registry: &mut TaskRegistry, settings: &Settings) -> Result<()> {
    let (env, lab) = (&settings.env, &settings.lab);

    registry.register(
        Task::new("binder")
            .doc("get ready to run on binder")
            .file_dep([&lab.dev_static_package, &lab.dev_static_licenses])
            .action(Action::RemoveTree(env.app_dir.clone()))
            .action(Action::EnsureDir(env.app_dir.clone()))
            .action(Action::copy_tree(&lab.dev_static, &env.app_static))
            .targets([env.app_static.join("package.json")]),
    )
}

fn register_env(registry: &mut TaskRegistry, settings: &Settings) -> Result<()> {
    let env = &settings.env;

    registry.register_in(
        "env",
        Task::new("update")
            .doc("create or update the isolated environment")
            .file_dep([&env.yaml])
            .action(Action::run([
                "mamba".to_string(),
                "env".to_string(),
                "update".to_string(),
                "-p".to_string(),
                path_arg(&env.prefix),
                "--file".to_string(),
                path_arg(&env.yaml),
            ]))
            .targets([&env.history]),
    )
}

fn register_setup(registry: &mut TaskRegistry, settings: &Settings, commands: &Commands) -> Result<()> {
    let (env, lab, server) = (&settings.env, &settings.lab, &settings.server);

    registry.register_in(
        "setup",
        Task::new("yarn")
            .file_dep([&env.history])
            .file_dep(&lab.packages_json)
            .action(Action::run_in(
                extend(&commands.yarn, &["--ignore-optional"]),
                &lab.root,
            ))
            .targets([&lab.yarn_integrity]),
    )?;

    registry.register_in(
        "setup",
        Task::new("pip:server")
            .file_dep([&env.history])
            .action(Action::run_in(commands.setup_editable.clone(), &server.root)),
    )?;

    registry.register_in(
        "setup",
        Task::new("pip:lab")
            .task_dep(["setup:pip:server", "setup:yarn"])
            .file_dep([&env.history])
            .action(Action::run_in(commands.setup_editable.clone(), &lab.root)),
    )?;

    registry.register_in(
        "setup",
        Task::new("pip:check")
            .task_dep(["setup:pip:lab", "setup:pip:server"])
            .action(Action::run(extend(&commands.pip, &["check"])))
            .action(Action::Touch(env.pip_check_ok.clone()))
            .targets([&env.pip_check_ok]),
    )?;

    registry.register_in(
        "setup",
        Task::new("server_ext")
            .doc("enable the lab server extension in the environment")
            .task_dep(["setup:pip:lab"])
            .action(Action::run(extend(
                &commands.python_m,
                &["jupyter", "server", "extension", "enable", "--sys-prefix", "jupyterlab"],
            )))
            .action(Action::Touch(env.server_ext_ok.clone()))
            .targets([&env.server_ext_ok]),
    )
}

fn register_lint(registry: &mut TaskRegistry, settings: &Settings, commands: &Commands) -> Result<()> {
    let (env, lab, server) = (&settings.env, &settings.lab, &settings.server);

    registry.register_in(
        "lint",
        Task::new("js")
            .task_dep(["setup:pip:lab"])
            .file_dep([&lab.yarn_integrity])
            .action(Action::run_in(extend(&commands.yarn, &["lint"]), &lab.root)),
    )?;

    let lint_py: Vec<String> = server.lint_sources.iter().map(|p| path_arg(p)).collect();

    registry.register_in(
        "lint",
        Task::new("py")
            .file_dep([&env.history])
            .file_dep(&server.lint_sources)
            .action(Action::run(extend(&commands.wrap(&["black"]), &lint_py)))
            .action(Action::run(extend(&commands.wrap(&["flake8"]), &lint_py))),
    )?;

    let mut prettier = extend(
        &commands.prettier,
        &["--write", "--prose-wrap=always", "--print-width=88"],
    );
    prettier.push(path_arg(&settings.readme));

    registry.register_in(
        "lint",
        Task::new("prettier")
            .file_dep([&lab.yarn_integrity])
            .action(Action::run(prettier)),
    )
}

fn register_integrity(registry: &mut TaskRegistry, settings: &Settings, commands: &Commands) -> Result<()> {
    let lab = &settings.lab;

    registry.register_in(
        "integrity",
        Task::new("buildutils")
            .file_dep(&lab.all_buildutils)
            .action(Action::run_in(extend(&commands.yarn, &["postinstall"]), &lab.root))
            .targets([&lab.buildutils_tsbuildinfo, &lab.builder_tsbuildinfo]),
    )?;

    registry.register_in(
        "integrity",
        Task::new("repo")
            .file_dep([&lab.buildutils_tsbuildinfo, &lab.builder_tsbuildinfo])
            .file_dep(&lab.all_ts_src)
            .file_dep(&lab.packages_json)
            .action(Action::EnsureDir(lab.build.clone()))
            .action(Action::Unlink(lab.integrity_ok.clone()))
            .action(Action::run_in(
                extend(&commands.yarn, &["node", "buildutils/lib/ensure-repo.js"]),
                &lab.root,
            ))
            .action(Action::Touch(lab.integrity_ok.clone()))
            .targets([&lab.integrity_ok]),
    )
}

fn register_build(registry: &mut TaskRegistry, settings: &Settings, commands: &Commands) -> Result<()> {
    let lab = &settings.lab;

    registry.register_in(
        "build",
        Task::new("lib")
            .file_dep([&lab.integrity_ok, &lab.yarn_integrity])
            .file_dep(&lab.all_ts_src)
            .action(Action::run_in(extend(&commands.yarn, &["build:packages"]), &lab.root))
            .targets([&lab.meta_tsbuildinfo]),
    )?;

    registry.register_in(
        "build",
        Task::new("dev:prod")
            .doc("do a prod build of dev_mode for licenses")
            .file_dep(&lab.dev_mode_sources)
            .file_dep([
                &lab.buildutils_tsbuildinfo,
                &lab.builder_tsbuildinfo,
                &lab.meta_tsbuildinfo,
            ])
            .action(Action::run_in(commands.yarn.clone(), &lab.dev_mode))
            .action(Action::run_in(extend(&commands.yarn, &["build:prod"]), &lab.dev_mode))
            .targets([&lab.dev_static_package, &lab.dev_static_licenses]),
    )
}

fn register_test(registry: &mut TaskRegistry, commands: &Commands) -> Result<()> {
    registry.register_in(
        "test",
        Task::new("server")
            .task_dep(["setup:pip:check"])
            .action(Action::run(extend(
                &commands.python_m,
                &[
                    "pytest",
                    "-x",
                    "--ff",
                    "--pyargs",
                    "jupyterlab_server",
                    "--cov",
                    "jupyterlab_server",
                    "--no-cov-on-fail",
                    "--cov-report",
                    "term-missing:skip-covered",
                ],
            ))),
    )
}

fn register_dev_mode(registry: &mut TaskRegistry, commands: &Commands) -> Result<()> {
    registry.register(
        Task::new("dev_mode")
            .doc("run JupyterLab under dev_mode")
            .always_run()
            .task_dep(["build:dev:prod"])
            .action(Action::launch(extend(&commands.lab, DEV_MODE_ARGS))),
    )?;

    registry.register(
        Task::new("dev_mode_watch")
            .doc("run JupyterLab under dev_mode and watch sources")
            .always_run()
            .task_dep(["build:dev:prod"])
            .action(Action::launch(extend(
                &extend(&commands.lab, DEV_MODE_ARGS),
                &["--watch"],
            ))),
    )
}

fn register_clean_all(registry: &mut TaskRegistry, settings: &Settings) -> Result<()> {
    let git_clean = ["git", "clean", "-dxf"];

    let mut task = Task::new("clean_all")
        .doc("ensure every darned thing is cleaned")
        .always_run()
        .action(Action::run_in(git_clean, &settings.lab.root))
        .action(Action::run_in(git_clean, &settings.server.root));

    if let Some(yarn_cache) = settings.yarn_cache() {
        task = task.action(Action::RemoveTree(yarn_cache));
    }

    registry.register(task.action(Action::RemoveTree(settings.env.prefix.clone())))
}

fn register_patched_prod(registry: &mut TaskRegistry, settings: &Settings, commands: &Commands) -> Result<()> {
    let (env, lab) = (&settings.env, &settings.lab);
    let tpl_json = env.app_static.join("third-party-licenses.json");
    let staging_package = env.app_staging.join("package.json");
    let builder_tgz = path_arg(&lab.builder_tgz);

    registry.register_in(
        "patched_prod",
        Task::new("builder:tgz")
            .doc("pack the local builder")
            .file_dep([&lab.builder_tsbuildinfo])
            .action(Action::run_in(extend(&commands.npm, &["pack", "."]), &lab.builder))
            .targets([&lab.builder_tgz]),
    )?;

    registry.register_in(
        "patched_prod",
        Task::new("lab:clean")
            .doc("rebuild the application directory from scratch")
            .file_dep([&lab.builder_tgz])
            .action(Action::RemoveTree(env.app_dir.clone()))
            .action(Action::call(extend(
                &commands.python_m,
                &["jupyter", "lab", "build", "--debug", "--minimize=False"],
            )))
            .targets([&staging_package]),
    )?;

    registry.register_in(
        "patched_prod",
        Task::new("lab:build")
            .doc("build the application with the patched builder")
            .file_dep([&lab.builder_tgz, &staging_package])
            .action(Action::run_in(extend(&commands.yarn, &["cache", "clean"]), &env.app_staging))
            .action(Action::run_in(
                extend(&commands.yarn, &["add", "--dev", builder_tgz.as_str()]),
                &env.app_staging,
            ))
            .action(Action::run_in(extend(&commands.yarn, &["build:prod"]), &env.app_staging))
            .targets([&tpl_json]),
    )?;

    registry.register_in(
        "patched_prod",
        Task::new("lab:run")
            .doc("run the patched production build")
            .always_run()
            .file_dep([&tpl_json])
            .action(Action::launch(extend(
                &commands.lab,
                &["--ServerApp.base_url", "/patched-prod/"],
            ))),
    )
}
