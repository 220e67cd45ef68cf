//! Poetry package manager adapter.

use relkit_core::adapter::{PackageTool, PublishCredentials};

/// Builds `poetry` command lines.
#[derive(Debug, Clone)]
pub struct PoetryTool {
    program: String,
}

impl Default for PoetryTool {
    fn default() -> Self {
        Self::new("poetry")
    }
}

impl PoetryTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }
}

impl PackageTool for PoetryTool {
    fn name(&self) -> &'static str {
        "poetry"
    }

    fn lock_command(&self) -> Vec<String> {
        self.command(&["lock"])
    }

    fn install_command(&self, all_extras: bool) -> Vec<String> {
        let mut argv = self.command(&["install", "--no-cache", "-vv"]);
        if all_extras {
            argv.push("--all-extras".to_string());
        }
        argv
    }

    fn build_command(&self) -> Vec<String> {
        self.command(&["build"])
    }

    fn publish_command(&self, credentials: &PublishCredentials) -> Vec<String> {
        let mut argv = self.command(&["publish"]);
        if let Some(username) = &credentials.username {
            argv.push("--username".to_string());
            argv.push(username.clone());
        }
        if let Some(password) = &credentials.password {
            argv.push("--password".to_string());
            argv.push(password.clone());
        }
        if let Some(repository) = &credentials.repository {
            argv.push("--repository".to_string());
            argv.push(repository.clone());
        }
        argv
    }

    fn test_command(&self, workers: usize) -> Vec<String> {
        let mut argv = self.command(&["run", "pytest"]);
        if workers > 1 {
            argv.push("-n".to_string());
            argv.push(workers.to_string());
        }
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_command_with_extras() {
        let tool = PoetryTool::default();
        assert_eq!(
            tool.install_command(false),
            vec!["poetry", "install", "--no-cache", "-vv"]
        );
        assert_eq!(
            tool.install_command(true).last().map(String::as_str),
            Some("--all-extras")
        );
    }

    #[test]
    fn test_test_command_workers() {
        let tool = PoetryTool::default();
        assert_eq!(tool.test_command(1), vec!["poetry", "run", "pytest"]);
        assert_eq!(
            tool.test_command(4),
            vec!["poetry", "run", "pytest", "-n", "4"]
        );
    }

    #[test]
    fn test_publish_command_includes_credentials() {
        let tool = PoetryTool::new("/opt/poetry/bin/poetry");
        let credentials = PublishCredentials {
            username: Some("__token__".to_string()),
            password: Some("pypi-secret".to_string()),
            repository: Some("testpypi".to_string()),
        };
        assert_eq!(
            tool.publish_command(&credentials),
            vec![
                "/opt/poetry/bin/poetry",
                "publish",
                "--username",
                "__token__",
                "--password",
                "pypi-secret",
                "--repository",
                "testpypi",
            ]
        );
    }

    #[test]
    fn test_publish_command_without_credentials() {
        let tool = PoetryTool::default();
        assert_eq!(
            tool.publish_command(&PublishCredentials::default()),
            vec!["poetry", "publish"]
        );
    }
}
