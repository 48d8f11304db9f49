//! Android emulator control through the `emulator` and `adb` command lines

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::traits::DeviceControlTool;
use super::types::DeviceConfig;
use crate::command;
use crate::Error;

/// Emulator-backed device control
#[derive(Debug)]
pub struct EmulatorTool {
    emulator_path: String,
    adb_path: String,
    extra_args: Vec<String>,
    timeout: Duration,
    children: Mutex<HashMap<String, Child>>,
}

impl EmulatorTool {
    pub fn new<S: Into<String>>(emulator_path: S, adb_path: S) -> Self {
        Self {
            emulator_path: emulator_path.into(),
            adb_path: adb_path.into(),
            extra_args: vec![
                "-no-window".to_string(),
                "-no-audio".to_string(),
                "-no-boot-anim".to_string(),
                "-no-snapshot-save".to_string(),
            ],
            timeout: command::DEFAULT_TIMEOUT,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default headless flags
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Bound every adb or emulator invocation by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn serial(port: u16) -> String {
        format!("emulator-{}", port)
    }

    fn launch_args(&self, config: &DeviceConfig, port: u16) -> Vec<String> {
        let mut args = vec![
            "-avd".to_string(),
            config.device_type.clone(),
            "-port".to_string(),
            port.to_string(),
            "-memory".to_string(),
            config.memory_mb.to_string(),
            "-skin".to_string(),
            format!("{}x{}", config.resolution.width, config.resolution.height),
            "-prop".to_string(),
            format!("ro.sf.lcd_density={}", config.density),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn lock_children(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Child>>, Error> {
        self.children
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }
}

#[async_trait]
impl DeviceControlTool for EmulatorTool {
    async fn verify(&self) -> Result<(), Error> {
        command::run(&self.adb_path, &["version"], self.timeout)
            .await
            .map_err(|e| Error::configuration(format!("adb unusable at '{}': {}", self.adb_path, e)))?;
        command::run(&self.emulator_path, &["-version"], self.timeout)
            .await
            .map_err(|e| Error::configuration(format!("emulator unusable at '{}': {}", self.emulator_path, e)))?;
        Ok(())
    }

    async fn launch(&self, config: &DeviceConfig, port: u16) -> Result<String, Error> {
        let serial = Self::serial(port);
        let child = Command::new(&self.emulator_path)
            .args(self.launch_args(config, port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(format!("Failed to spawn emulator: {}", e)))?;

        info!("Spawned emulator {} (pid {:?})", serial, child.id());
        self.lock_children()?.insert(serial.clone(), child);
        Ok(serial)
    }

    async fn is_ready(&self, handle: &str) -> Result<bool, Error> {
        {
            let mut children = self.lock_children()?;
            if let Some(child) = children.get_mut(handle) {
                if let Ok(Some(status)) = child.try_wait() {
                    children.remove(handle);
                    return Err(Error::tool(format!("Emulator {} exited early with {}", handle, status)));
                }
            }
        }

        let args = ["-s", handle, "shell", "getprop", "sys.boot_completed"];
        match command::run(&self.adb_path, &args, self.timeout).await {
            Ok(out) => Ok(out == "1"),
            // Offline until adbd comes up.
            Err(e) => {
                debug!("{} not reachable yet: {}", handle, e);
                Ok(false)
            }
        }
    }

    async fn terminate(&self, handle: &str) -> Result<(), Error> {
        command::run(&self.adb_path, &["-s", handle, "emu", "kill"], self.timeout).await?;

        loop {
            {
                let mut children = self.lock_children()?;
                match children.get_mut(handle) {
                    None => return Ok(()),
                    Some(child) => {
                        if let Ok(Some(_)) = child.try_wait() {
                            children.remove(handle);
                            return Ok(());
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn kill(&self, handle: &str) -> Result<(), Error> {
        let child = self.lock_children()?.remove(handle);
        match child {
            Some(mut child) => child
                .kill()
                .await
                .map_err(|e| Error::tool(format!("Failed to kill {}: {}", handle, e))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args() {
        let tool = EmulatorTool::new("emulator", "adb");
        let config = DeviceConfig::preset("pixel_6").unwrap();
        let args = tool.launch_args(&config, 5556);

        assert_eq!(&args[..4], &["-avd", "pixel_6", "-port", "5556"]);
        assert!(args.contains(&"1080x2400".to_string()));
        assert!(args.contains(&"ro.sf.lcd_density=420".to_string()));
        assert!(args.contains(&"-no-window".to_string()));
        assert_eq!(EmulatorTool::serial(5556), "emulator-5556");
    }

    #[tokio::test]
    async fn test_verify_reports_missing_binaries() {
        let tool = EmulatorTool::new("/nonexistent/emulator", "/nonexistent/adb");
        let result = tool.verify().await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_kill_unknown_handle_is_noop() {
        let tool = EmulatorTool::new("emulator", "adb");
        assert!(tool.kill("emulator-5554").await.is_ok());
    }
}
