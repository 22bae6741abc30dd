use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use smokers_table::{
    Mailbox, Pacing, RoleConfig, RoleError, SmokerId, SysvMailbox, local_mailbox, run_consumer,
    run_producer,
};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, ExitCode, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "smokers-table", version, about = "The cigarette smokers problem over a message queue")]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info", env = "SMOKERS_LOG")]
    log_level: String,

    #[command(flatten)]
    role: RoleArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Args)]
struct RoleArgs {
    /// Pause after every narrated step, in milliseconds.
    #[arg(long, global = true, default_value_t = 100, env = "SMOKERS_STEP_DELAY_MS")]
    step_delay_ms: u64,

    /// Pause between two seller rounds, in milliseconds.
    #[arg(long, global = true, default_value_t = 5000, env = "SMOKERS_ROUND_DELAY_MS")]
    round_delay_ms: u64,

    /// Pause between starting two participants, in milliseconds.
    #[arg(long, global = true, default_value_t = 1000, env = "SMOKERS_SPAWN_DELAY_MS")]
    spawn_delay_ms: u64,

    /// Stop after this many rounds instead of running forever.
    #[arg(long, global = true, env = "SMOKERS_ROUNDS")]
    rounds: Option<u64>,

    /// Seed for the seller's ingredient picks.
    #[arg(long, global = true, env = "SMOKERS_SEED")]
    seed: Option<u64>,
}

impl RoleArgs {
    fn to_config(&self) -> RoleConfig {
        RoleConfig {
            pacing: Pacing {
                step_delay: Duration::from_millis(self.step_delay_ms),
                round_delay: Duration::from_millis(self.round_delay_ms),
                spawn_delay: Duration::from_millis(self.spawn_delay_ms),
            },
            rounds: self.rounds,
            seed: self.seed,
        }
    }

    /// Command-line form of these settings, for child processes.
    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--step-delay-ms={}", self.step_delay_ms),
            format!("--round-delay-ms={}", self.round_delay_ms),
            format!("--spawn-delay-ms={}", self.spawn_delay_ms),
        ];
        if let Some(rounds) = self.rounds {
            args.push(format!("--rounds={rounds}"));
        }
        if let Some(seed) = self.seed {
            args.push(format!("--seed={seed}"));
        }
        args
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Set up the table and start the seller and three smokers as processes.
    Run {
        /// System V key of the table queue [default: your uid].
        #[arg(long, env = "SMOKERS_KEY")]
        key: Option<i32>,
    },
    /// Run the seller and three smokers as threads of this process.
    Local,
    /// Run the seller against an existing table queue.
    Seller {
        /// Id of the table queue.
        queue_id: i32,
    },
    /// Run one smoker against an existing table queue.
    Smoker {
        /// Smoker id, which is also the ingredient it holds (1..=3).
        #[arg(value_parser = parse_smoker_id)]
        id: SmokerId,
        /// Id of the table queue.
        queue_id: i32,
    },
    /// Remove a table queue left behind by a previous run.
    Destroy {
        /// Id of the table queue.
        queue_id: i32,
    },
}

fn parse_smoker_id(s: &str) -> Result<SmokerId, String> {
    s.parse::<u8>()
        .ok()
        .and_then(SmokerId::new)
        .ok_or_else(|| format!("{s} is not a smoker id (expected 1, 2 or 3)"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }
    let config = cli.role.to_config();

    let result = match cli.command {
        Commands::Run { key } => run_table(key, &cli.role, &cli.log_level),
        Commands::Local => run_local(&config),
        Commands::Seller { queue_id } => SysvMailbox::attach(queue_id)
            .context("seller cannot reach the table")
            .and_then(|table| seller_role(table, &config)),
        Commands::Smoker { id, queue_id } => SysvMailbox::attach(queue_id)
            .with_context(|| format!("{id} cannot reach the table"))
            .and_then(|table| smoker_role(id, table, &config)),
        Commands::Destroy { queue_id } => SysvMailbox::attach(queue_id)
            .and_then(|table| table.destroy())
            .with_context(|| format!("cannot destroy table queue {queue_id}")),
    };

    ExitCode::from(exit_status(&result))
}

/// Installs the fmt subscriber. `RUST_LOG`, when set, overrides `level`.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

/// Process exit status for a finished command. A failure logs its whole
/// error chain and exits with 1, teardown included.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            error!("{err:#}");
            1
        }
    }
}

fn seller_role<M: Mailbox>(table: M, config: &RoleConfig) -> Result<()> {
    role_result("seller", None, run_producer(table, config))
}

fn smoker_role<M: Mailbox>(id: SmokerId, table: M, config: &RoleConfig) -> Result<()> {
    role_result("smoker", Some(id), run_consumer(id, table, config))
}

/// Adds the role to a failed loop's error so the diagnostic names who died.
fn role_result(role: &str, id: Option<SmokerId>, result: Result<(), RoleError>) -> Result<()> {
    result.with_context(|| match id {
        Some(id) => format!("{role} {}", id.get()),
        None => role.to_string(),
    })
}

/// How a participant process ended.
struct Exit {
    name: String,
    status: io::Result<ExitStatus>,
}

impl Exit {
    fn succeeded(&self) -> bool {
        matches!(&self.status, Ok(status) if status.success())
    }
}

enum Event {
    Interrupted,
    Exited(Exit),
}

/// Command line for one participant. Each child leads its own process
/// group, so a terminal Ctrl+C reaches only the orchestrator and the
/// children stop through teardown.
fn participant_command(exe: &Path, args: &[String]) -> Command {
    let mut command = Command::new(exe);
    command.args(args).process_group(0);
    command
}

/// Starts `name` as a child process and reaps it on a background thread.
fn spawn_participant(
    exe: &Path,
    name: String,
    args: Vec<String>,
    events: mpsc::Sender<Event>,
) -> Result<u32> {
    let mut child = participant_command(exe, &args)
        .spawn()
        .with_context(|| format!("could not fork {name}"))?;
    let pid = child.id();
    info!(pid, "forked {name}");

    thread::spawn(move || {
        let status = child.wait();
        let _ = events.send(Event::Exited(Exit { name, status }));
    });
    Ok(pid)
}

/// Creates the table queue, starts every participant as a process and blocks
/// until Ctrl+C or until any participant exits. Then breaks the table, which
/// makes the remaining participants exit, and reaps them.
fn run_table(key: Option<i32>, role: &RoleArgs, log_level: &str) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    {
        let (tx, interrupted) = (tx.clone(), interrupted.clone());
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            let _ = tx.send(Event::Interrupted);
        })
        .context("cannot install Ctrl+C handler")?;
    }

    let key = key.unwrap_or_else(SysvMailbox::default_key);
    let table = SysvMailbox::create_or_attach(key).context("cannot set up the table")?;
    info!(queue = table.id(), "created table queue");

    let pacing = role.to_config().pacing;
    let mut common = role.to_args();
    common.push(format!("--log-level={log_level}"));

    let mut participants = vec![("seller".to_string(), vec!["seller".to_string()])];
    for id in SmokerId::ALL {
        participants.push((id.to_string(), vec!["smoker".to_string(), id.get().to_string()]));
    }

    let mut pids = Vec::with_capacity(participants.len());
    let mut spawn_error = None;
    for (name, mut args) in participants {
        args.push(table.id().to_string());
        args.extend(common.iter().cloned());
        match spawn_participant(&exe, name, args, tx.clone()) {
            Ok(pid) => pids.push(pid),
            Err(err) => {
                spawn_error = Some(err);
                break;
            }
        }
        pacing.after_spawn();
    }
    drop(tx);

    let first = match spawn_error {
        Some(_) => None,
        None => match rx.recv() {
            Ok(Event::Exited(exit)) => {
                report_exit(&exit);
                Some(exit)
            }
            Ok(Event::Interrupted) | Err(_) => None,
        },
    };

    let broken = table.destroy().context("cannot break the table");
    match &broken {
        Ok(()) => info!("table is broken. no more smoking."),
        Err(err) => {
            warn!("{err:#}; terminating participants");
            terminate(&pids);
        }
    }
    reap(&rx, pids.len() - usize::from(first.is_some()));

    if let Some(err) = spawn_error {
        return Err(err);
    }
    broken?;
    verdict(interrupted.load(Ordering::SeqCst), first.as_ref())
}

/// Outcome of a `run`: an interrupt always ends it cleanly, otherwise the
/// participant that left first decides.
fn verdict(interrupted: bool, first: Option<&Exit>) -> Result<()> {
    match first {
        Some(exit) if !interrupted && !exit.succeeded() => {
            anyhow::bail!("{} left the table unexpectedly", exit.name)
        }
        _ => Ok(()),
    }
}

/// Logs how a participant ended.
fn report_exit(exit: &Exit) {
    match &exit.status {
        Ok(status) if status.success() => info!("{} left the table", exit.name),
        Ok(status) => warn!("{} left the table: {status}", exit.name),
        Err(err) => warn!("cannot wait for {}: {err}", exit.name),
    }
}

/// Waits for `remaining` participants to exit after the table is broken.
fn reap(rx: &mpsc::Receiver<Event>, mut remaining: usize) {
    while remaining > 0 {
        match rx.recv() {
            Ok(Event::Exited(exit)) => {
                match &exit.status {
                    Ok(status) => info!("{} left the table: {status}", exit.name),
                    Err(err) => warn!("cannot wait for {}: {err}", exit.name),
                }
                remaining -= 1;
            }
            Ok(Event::Interrupted) => {}
            Err(_) => break,
        }
    }
}

/// Last resort when the queue cannot be removed: nothing else would wake
/// the participants.
fn terminate(pids: &[u32]) {
    for &pid in pids {
        if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == -1 {
            warn!(pid, "cannot terminate participant: {}", io::Error::last_os_error());
        }
    }
}

/// Same cast as [`run_table`], but as threads over an in-process mailbox.
fn run_local(config: &RoleConfig) -> Result<()> {
    let table = local_mailbox();

    let (tx, rx) = mpsc::channel::<Option<(String, Result<(), RoleError>)>>();
    {
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(None);
        })
        .context("cannot install Ctrl+C handler")?;
    }

    let mut handles = Vec::new();
    {
        let (table, config, tx) = (table.clone(), config.clone(), tx.clone());
        handles.push(thread::spawn(move || {
            let result = run_producer(table, &config);
            let _ = tx.send(Some(("seller".to_string(), result)));
        }));
    }
    for id in SmokerId::ALL {
        let (table, config, tx) = (table.clone(), config.clone(), tx.clone());
        handles.push(thread::spawn(move || {
            let result = run_consumer(id, table, &config);
            let _ = tx.send(Some((id.to_string(), result)));
        }));
    }
    drop(tx);

    // Whatever stops first, stop everyone.
    let first = rx.recv().ok().flatten();
    table.destroy()?;
    info!("table is broken. no more smoking.");
    for handle in handles {
        let _ = handle.join();
    }

    match first {
        Some((name, Err(err))) if !err.is_teardown() => {
            Err(anyhow::Error::new(err).context(name))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smokers_table::{Phase, RandomSupply, Supply, tag, target_smoker};
    use std::os::unix::process::ExitStatusExt;

    fn forever() -> RoleConfig {
        RoleConfig {
            pacing: Pacing::none(),
            ..RoleConfig::default()
        }
    }

    fn exit(name: &str, raw_status: i32) -> Exit {
        Exit {
            name: name.to_string(),
            status: Ok(ExitStatus::from_raw(raw_status)),
        }
    }

    #[test]
    fn participants_lead_their_own_process_group() {
        let mut child = participant_command(Path::new("sleep"), &["5".to_string()])
            .spawn()
            .unwrap();
        let pid = child.id() as libc::pid_t;
        let group = unsafe { libc::getpgid(pid) };
        let own = unsafe { libc::getpgrp() };
        child.kill().unwrap();
        child.wait().unwrap();

        assert_eq!(group, pid);
        assert_ne!(group, own, "child shares the terminal's process group");
    }

    #[test]
    fn interrupt_ends_the_run_cleanly_whoever_left_first() {
        // Raw wait status 2: killed by SIGINT.
        let killed = exit("seller", 2);
        assert!(verdict(true, Some(&killed)).is_ok());
        assert!(verdict(true, None).is_ok());

        let err = verdict(false, Some(&killed)).unwrap_err();
        assert!(err.to_string().contains("seller"), "{err}");
        assert!(verdict(false, Some(&exit("smoker2", 0))).is_ok());
        assert!(verdict(false, Some(&exit("smoker2", 1 << 8))).is_err());
    }

    #[test]
    fn reap_waits_for_every_started_participant() {
        let (tx, rx) = mpsc::channel();
        tx.send(Event::Exited(exit("seller", 0))).unwrap();
        tx.send(Event::Interrupted).unwrap();
        tx.send(Event::Exited(exit("smoker1", 1 << 8))).unwrap();
        tx.send(Event::Exited(exit("smoker2", 1 << 8))).unwrap();

        reap(&rx, 2);
        match rx.try_recv() {
            Ok(Event::Exited(left)) => assert_eq!(left.name, "smoker2"),
            _ => panic!("reap consumed more exits than it was asked to"),
        }
    }

    #[test]
    fn success_exits_with_zero() {
        assert_eq!(exit_status(&Ok(())), 0);
    }

    #[cfg(target_os = "linux")]
    mod teardown {
        use super::*;

        /// Private queue removed on drop, even if the test panics.
        struct Scratch(SysvMailbox);

        impl Drop for Scratch {
            fn drop(&mut self) {
                let _ = self.0.destroy();
            }
        }

        fn scratch() -> Scratch {
            Scratch(SysvMailbox::create_private().expect("msgget(IPC_PRIVATE)"))
        }

        #[test]
        fn smoker_diagnostic_names_the_smoker_and_the_step() {
            let table = scratch();
            let queue = table.0;
            let id = SmokerId::new(3).unwrap();

            let smoker = thread::spawn(move || smoker_role(id, queue, &forever()));
            queue.recv_matching(tag(id, Phase::Request)).unwrap();
            queue.destroy().unwrap();

            let result = smoker.join().unwrap();
            assert_eq!(exit_status(&result), 1);
            let chain = format!("{:#}", result.unwrap_err());
            assert!(chain.contains("smoker 3"), "{chain}");
            assert!(chain.contains("await confirmation"), "{chain}");
            assert!(chain.contains(&format!("tag {}", tag(id, Phase::Grant))), "{chain}");
        }

        #[test]
        fn seller_diagnostic_names_the_step() {
            let table = scratch();
            let queue = table.0;
            let (first, second) = RandomSupply::new(Some(9)).draw();
            let target = target_smoker(first, second).unwrap();

            let seller = thread::spawn(move || seller_role(queue, &forever().with_seed(9)));
            queue.recv_matching(tag(target, Phase::Deliver)).unwrap();
            queue.destroy().unwrap();

            let result = seller.join().unwrap();
            assert_eq!(exit_status(&result), 1);
            let chain = format!("{:#}", result.unwrap_err());
            assert!(chain.starts_with("seller"), "{chain}");
            assert!(chain.contains("await smoke request"), "{chain}");
            assert!(chain.contains(&format!("tag {}", tag(target, Phase::Request))), "{chain}");
        }
    }
}
