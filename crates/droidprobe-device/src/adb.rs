//! adb-backed device.
//!
//! Every public operation holds the device mutex for its whole command
//! sequence (dump + cat + rm, screencap + pull + rm), so concurrent callers
//! never interleave scratch-file use.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use droidprobe_ui::types::{ScreenSize, UiElement};

use crate::config::DeviceConfig;
use crate::device::{AppManager, Device, DeviceError, SystemProxy};

const KEYCODE_BACK: &str = "4";
const KEYCODE_MOVE_END: &str = "KEYCODE_MOVE_END";
const KEYCODE_DEL: &str = "KEYCODE_DEL";

pub struct AdbDevice {
    config: DeviceConfig,
    serial: String,
    runtime: Runtime,
    lock: Mutex<()>,
}

impl AdbDevice {
    /// Connect to the configured device, or the first attached one.
    pub fn connect(config: DeviceConfig) -> Result<Self, DeviceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let serial = match &config.serial {
            Some(serial) => serial.clone(),
            None => {
                let listing = run_adb(
                    &runtime,
                    &config,
                    None,
                    &["devices"],
                    config.command_timeout(),
                )?;
                first_ready_device(&listing).ok_or(DeviceError::NoDevice)?
            }
        };
        info!(serial = %serial, "connected to device");

        Ok(Self {
            config,
            serial,
            runtime,
            lock: Mutex::new(()),
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn serialized(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exec(&self, args: &[&str]) -> Result<String, DeviceError> {
        self.exec_with_timeout(args, self.config.command_timeout())
    }

    fn exec_with_timeout(&self, args: &[&str], timeout: Duration) -> Result<String, DeviceError> {
        run_adb(&self.runtime, &self.config, Some(&self.serial), args, timeout)
    }

    /// Tap the centre of `element`. Caller holds the device lock.
    fn tap(&self, element: &UiElement) -> Result<(), DeviceError> {
        let (x, y) = element.bounds.center();
        let (x, y) = (x.to_string(), y.to_string());
        self.exec(&["shell", "input", "tap", x.as_str(), y.as_str()])?;
        Ok(())
    }

    fn is_installed(&self, package: &str) -> Result<bool, DeviceError> {
        let listing = self.exec(&["shell", "pm", "list", "packages"])?;
        let wanted = format!("package:{package}");
        Ok(listing.lines().any(|line| line.trim() == wanted))
    }
}

fn run_adb(
    runtime: &Runtime,
    config: &DeviceConfig,
    serial: Option<&str>,
    args: &[&str],
    timeout: Duration,
) -> Result<String, DeviceError> {
    let command = format!("adb {}", args.join(" "));
    let mut cmd = Command::new(&config.adb_path);
    if let Some(serial) = serial {
        cmd.arg("-s").arg(serial);
    }
    cmd.args(args).kill_on_drop(true);

    debug!(command = %command, "running adb");
    let output = runtime
        .block_on(async { tokio::time::timeout(timeout, cmd.output()).await })
        .map_err(|_| DeviceError::Timeout {
            command: command.clone(),
            timeout_secs: timeout.as_secs(),
        })??;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(DeviceError::Command {
            command,
            output: format!("{stdout}{}", stderr.trim()),
        })
    }
}

impl Device for AdbDevice {
    fn dump_hierarchy(&self) -> Result<String, DeviceError> {
        let _guard = self.serialized();
        let remote = self.config.remote_dump_path.as_str();

        // uiautomator reports failures on stdout with exit status 0; the cat
        // below is what tells us whether a dump exists.
        if let Err(e) = self.exec(&["shell", "uiautomator", "dump", remote]) {
            debug!(error = %e, "uiautomator dump failed");
        }
        let content = self.exec(&["shell", "cat", remote]);
        let _ = self.exec(&["shell", "rm", remote]);

        match content {
            Ok(xml) if xml.contains("<hierarchy") => Ok(xml),
            Ok(other) => Err(DeviceError::NoHierarchy { reason: other }),
            Err(e) => Err(DeviceError::NoHierarchy {
                reason: e.to_string(),
            }),
        }
    }

    fn click(&self, element: &UiElement) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        self.tap(element)
    }

    /// `input text` appends, so the field's current text is deleted first.
    fn set_text(&self, element: &UiElement, text: &str) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        self.tap(element)?;
        let mut clear = vec!["shell", "input", "keyevent"];
        clear.extend(clear_field_keys(&element.text));
        self.exec(&clear)?;
        let escaped = escape_input_text(text);
        self.exec(&["shell", "input", "text", escaped.as_str()])?;
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        let remote = self.config.remote_screenshot_path.as_str();
        self.exec(&["shell", "screencap", "-p", remote])?;
        let local = path.to_string_lossy();
        let pulled = self.exec(&["pull", remote, local.as_ref()]);
        let _ = self.exec(&["shell", "rm", remote]);
        pulled.map(|_| ())
    }

    fn screen_size(&self) -> Result<ScreenSize, DeviceError> {
        let _guard = self.serialized();
        let output = self.exec(&["shell", "wm", "size"])?;
        parse_wm_size(&output).ok_or_else(|| DeviceError::UnexpectedOutput {
            command: "adb shell wm size".to_string(),
            output,
        })
    }

    fn press_back(&self) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        self.exec(&["shell", "input", "keyevent", KEYCODE_BACK])?;
        Ok(())
    }
}

impl AppManager for AdbDevice {
    fn install(&self, apk: &Path) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        let apk_arg = apk.to_string_lossy();
        let args = install_args(apk_arg.as_ref(), self.config.grant_permissions);
        info!(apk = %apk_arg, "installing package");
        let output = self.exec_with_timeout(&args, self.config.install_timeout())?;
        if output.contains("Success") {
            Ok(())
        } else {
            Err(DeviceError::Command {
                command: format!("adb {}", args.join(" ")),
                output,
            })
        }
    }

    fn uninstall(&self, package: &str) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        info!(package, "uninstalling package");
        match self.exec(&["uninstall", package]) {
            Ok(output) if output.contains("Success") => return Ok(()),
            Ok(output) => debug!(output = %output, "uninstall output lacks Success"),
            Err(e) => debug!(error = %e, "uninstall command failed"),
        }

        // Uninstalling an absent package fails, and some builds succeed
        // without printing Success: the package list is authoritative.
        if self.is_installed(package)? {
            warn!(package, "package still installed after uninstall");
            Err(DeviceError::Command {
                command: format!("adb uninstall {package}"),
                output: "package still installed".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn launch(&self, package: &str) -> Result<(), DeviceError> {
        {
            let _guard = self.serialized();
            info!(package, "launching app");
            self.exec(&[
                "shell",
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ])?;
        }
        std::thread::sleep(self.config.launch_settle());
        Ok(())
    }
}

impl SystemProxy for AdbDevice {
    fn set_http_proxy(&self, host: &str, port: u16) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        let setting = format!("{host}:{port}");
        info!(proxy = %setting, "setting device http proxy");
        self.exec(&["shell", "settings", "put", "global", "http_proxy", setting.as_str()])?;
        Ok(())
    }

    fn clear_http_proxy(&self) -> Result<(), DeviceError> {
        let _guard = self.serialized();
        info!("clearing device http proxy");
        self.exec(&["shell", "settings", "put", "global", "http_proxy", ":0"])?;
        Ok(())
    }
}

/// First serial in `adb devices` output whose state is `device`.
pub fn first_ready_device(listing: &str) -> Option<String> {
    listing
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            (parts.next()? == "device").then(|| serial.to_string())
        })
        .next()
}

fn wm_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(Physical|Override) size:\s*(\d+)x(\d+)").expect("wm size pattern"))
}

/// Parse `wm size` output. An override size wins over the physical one.
pub fn parse_wm_size(output: &str) -> Option<ScreenSize> {
    let mut physical = None;
    let mut overridden = None;
    for caps in wm_size_re().captures_iter(output) {
        let size = ScreenSize::new(caps[2].parse().ok()?, caps[3].parse().ok()?);
        match &caps[1] {
            "Override" => overridden = Some(size),
            _ => physical = Some(size),
        }
    }
    overridden.or(physical)
}

/// Arguments for `adb install`. Runtime permissions are only granted up
/// front when asked for; otherwise their popups appear during exploration.
pub fn install_args(apk: &str, grant_permissions: bool) -> Vec<&str> {
    let mut args = vec!["install", "-r"];
    if grant_permissions {
        args.push("-g");
    }
    args.push(apk);
    args
}

/// Key events that move the cursor to the end of a field holding `current`
/// and delete every character of it.
pub fn clear_field_keys(current: &str) -> Vec<&'static str> {
    std::iter::once(KEYCODE_MOVE_END)
        .chain(std::iter::repeat(KEYCODE_DEL).take(current.chars().count()))
        .collect()
}

/// Escape text for `input text`: spaces become `%s`, shell metacharacters
/// are backslash-escaped.
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '(' | ')' | '<' | '>' | '|' | ';' | '&' | '*' | '\\' | '~' | '"' | '\'' | '$'
            | '`' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
