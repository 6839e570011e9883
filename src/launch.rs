use crate::error::Error;
use crate::patch::{patch_args, PatchContext};
use crate::quote::Quoting;
use crate::sd_debug;
use std::collections::HashMap;
use std::io;
use std::process::{Child, Command};

/// Prepares interpreter subprocesses so that they run under the debugger.
#[derive(Debug, Clone)]
pub struct Launcher {
    context: Option<PatchContext>,
    quoting: Quoting,
}

impl Launcher {
    /// Create launcher, without a context command lines are not patched.
    pub fn new(context: Option<PatchContext>) -> Self {
        Self {
            context,
            quoting: Quoting::host(),
        }
    }

    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    /// Return patched command line tokens.
    pub fn patch<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        match &self.context {
            Some(ctx) => patch_args(args, ctx),
            None => args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    /// Return patched command line as a single string.
    pub fn command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
        self.quoting.command_line(&self.patch(args))
    }

    /// Build a command from a patched command line and an environment.
    pub fn command<S: AsRef<str>>(
        &self,
        args: &[S],
        env: &HashMap<String, String>,
    ) -> Result<Command, Error> {
        let args = self.patch(args);
        let (program, rest) = args.split_first().ok_or_else(|| {
            Error::IO(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))
        })?;

        let mut command = Command::new(program);
        command.args(rest).envs(env);
        Ok(command)
    }

    pub fn spawn<S: AsRef<str>>(
        &self,
        args: &[S],
        env: &HashMap<String, String>,
    ) -> Result<Child, Error> {
        let mut command = self.command(args, env)?;
        sd_debug!("spawn subprocess: {command:?}");
        Ok(command.spawn()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command() {
        let launcher = Launcher::new(Some(PatchContext::new(7, 8)));
        let env = HashMap::from([("KEY".to_string(), "VALUE".to_string())]);
        let command = launcher.command(&["py", "x.py"], &env).unwrap();

        assert_eq!(command.get_program(), "py");
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.first().map(String::as_str), Some("-m"));
        assert_eq!(args.last().map(String::as_str), Some("x.py"));
        assert_eq!(
            command.get_envs().collect::<Vec<_>>(),
            [(std::ffi::OsStr::new("KEY"), Some(std::ffi::OsStr::new("VALUE")))]
        );

        assert!(launcher.command::<&str>(&[], &env).is_err());
    }

    #[test]
    fn test_no_context() {
        let launcher = Launcher::new(None).with_quoting(Quoting::Windows);
        assert_eq!(launcher.patch(&["py", "x.py"]), ["py", "x.py"]);
        assert_eq!(launcher.command_line(&["py", "my x.py"]), r#"py "my x.py""#);
    }

    #[test]
    fn test_spawn_unpatched() {
        let launcher = Launcher::new(Some(PatchContext::new(7, 8)));
        // not an interpreter invocation with a supported target, runs as is
        let mut child = launcher
            .spawn(&["true", "arg"], &HashMap::new())
            .unwrap();
        assert!(child.wait().unwrap().success());
    }
}
