use crate::descriptor::ServiceDescriptor;

/// Serializes a descriptor into whatever the host init system loads.
pub trait ScriptRenderer: Send + Sync {
    fn render(&self, descriptor: &ServiceDescriptor) -> String;
}

/// OpenWrt `/etc/rc.common` script driving a procd instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcdRenderer;

impl ScriptRenderer for ProcdRenderer {
    fn render(&self, d: &ServiceDescriptor) -> String {
        let env = if d.env.is_empty() {
            String::new()
        } else {
            let pairs: Vec<String> = d
                .env
                .iter()
                .map(|(key, value)| shell_escape(&format!("{key}={value}")))
                .collect();
            format!("    procd_set_param env {}\n", pairs.join(" "))
        };
        let respawn = &d.respawn;

        format!(
            r#"#!/bin/sh /etc/rc.common
# generated by deckhand

START={start}
STOP={stop}
USE_PROCD=1

NAME={name}
PROG={prog}
APP={app}
WORKDIR={workdir}
LOGFILE={logfile}

start_service() {{
    echo "Starting $NAME service..."
    rm -f "$LOGFILE"
    procd_open_instance
    procd_set_param command "$PROG" "$APP"
    procd_set_param cwd "$WORKDIR"
    procd_set_param respawn {threshold} {timeout} {retry}
{env}    procd_close_instance
    echo "Service started, logging to $LOGFILE"
}}

stop_service() {{
    pid=$(pgrep -f "$APP")
    if [ -n "$pid" ]; then
        kill -9 $pid
        echo "Service stopped"
    else
        echo "Service not running"
    fi
}}
"#,
            start = d.start_priority,
            stop = d.stop_priority,
            name = shell_escape(&d.name),
            prog = shell_escape(&d.interpreter.to_string_lossy()),
            app = shell_escape(&d.entry_point.to_string_lossy()),
            workdir = shell_escape(&d.working_dir.to_string_lossy()),
            logfile = shell_escape(&d.log_file.to_string_lossy()),
            threshold = respawn.threshold_secs,
            timeout = respawn.timeout_secs,
            retry = respawn.retry,
        )
    }
}

fn shell_escape(value: &str) -> String {
    if value.is_empty() {
        "''".to_string()
    } else if value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"/._-=".contains(&b))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\"'\"'"))
    }
}
