//! Membership Plan Utility
//!
//! Reads a plan file describing one scope's recorded and desired membership
//! and prints the changes a reconciliation pass would make.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin membership-plan -- <plan.json> [--simulate]
//! ```
//!
//! ## Plan File
//!
//! ```json
//! {
//!   "scope": { "type": "organization", "org_id": 1 },
//!   "recorded": [{ "identity_key": "alice@example.com", "role": "Editor" }],
//!   "desired": [
//!     { "identity_key": "alice@example.com", "role": "Admin" },
//!     { "identity_key": "bob@example.com", "role": "Viewer" }
//!   ],
//!   "directory": ["bob@example.com"],
//!   "config": { "auto_create_users": false }
//! }
//! ```
//!
//! `directory` lists identities that exist remotely besides the recorded
//! ones, and `config` is an optional reconciler configuration; both are only
//! used by `--simulate`, which runs the pass against an in-memory remote
//! seeded with the recorded state and prints the membership read back.
//!
//! Environment overrides (`RECONCILER_RETRIES`, `RECONCILER_AUTO_CREATE_USERS`,
//! ...) apply on top of `config`. Set `RUST_LOG=debug` to see each mutation.
//!
//! ## Exit Codes
//!
//! - `0`: The plan was computed (and simulated, if requested)
//! - `1`: The plan file is invalid or the simulated pass failed

use membership_reconciler::principal::Principal;
use membership_reconciler::remote::InMemoryRemote;
use membership_reconciler::scope::{PrincipalKind, ReconciliationScope};
use membership_reconciler::{
    Change, ChangeSummary, MembershipSet, ReconcileError, Reconciler, ReconcilerConfig, SetKind,
    diff::diff,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::process;

#[derive(Debug, Deserialize)]
struct PlanFile {
    scope: ReconciliationScope,
    #[serde(default)]
    recorded: Vec<Principal>,
    #[serde(default)]
    desired: Vec<Principal>,
    #[serde(default)]
    directory: Vec<String>,
    #[serde(default)]
    config: ReconcilerConfig,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let simulate = args.iter().skip(1).any(|arg| arg == "--simulate");
    let path = args.iter().skip(1).find(|arg| !arg.starts_with("--"));

    let Some(path) = path else {
        eprintln!("Usage: {} <plan.json> [--simulate]", args[0]);
        process::exit(1);
    };

    let plan = match load_plan(path) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let (recorded, desired) = match build_sets(&plan) {
        Ok(sets) => sets,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let changes = diff(&recorded, &desired, plan.scope.role_tracking());
    print_plan(&plan.scope, &changes);
    println!("Desired fingerprint: {}", desired.fingerprint());

    if simulate {
        if let Err(e) = run_simulation(plan).await {
            eprintln!("Simulation failed: {}", e);
            for change in e.applied_changes() {
                eprintln!("  applied before failure: {}", change);
            }
            process::exit(1);
        }
    }
}

fn load_plan(path: &str) -> Result<PlanFile, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let mut plan: PlanFile = serde_json::from_str(&content)?;
    plan.config.apply_process_env()?;
    Ok(plan)
}

fn build_sets(plan: &PlanFile) -> Result<(MembershipSet, MembershipSet), ReconcileError> {
    let recorded = MembershipSet::from_principals(SetKind::Recorded, plan.recorded.clone())?;
    let desired = MembershipSet::from_principals(SetKind::Desired, plan.desired.clone())?;
    Ok((recorded, desired))
}

fn print_plan(scope: &ReconciliationScope, changes: &[Change]) {
    println!("Plan for {}:", scope);
    if changes.is_empty() {
        println!("  No changes. Membership is up to date.");
    }
    for change in changes {
        let marker = match change {
            Change::Add(_) => '+',
            Change::Update(_) => '~',
            Change::Remove(_) => '-',
        };
        println!("  {} {}", marker, change);
    }
    println!("Plan: {}", ChangeSummary::of(changes));
}

async fn seed_identity(remote: &InMemoryRemote, kind: PrincipalKind, key: &str) {
    if remote.lookup(kind, key).await.is_some() {
        return;
    }
    match kind {
        PrincipalKind::User => {
            remote.add_user(key, key).await;
        }
        PrincipalKind::Team => {
            remote.add_team(key).await;
        }
        PrincipalKind::ServiceAccount => {
            remote.add_service_account(key).await;
        }
    }
}

async fn run_simulation(plan: PlanFile) -> Result<(), ReconcileError> {
    let remote = InMemoryRemote::new();
    let scope = plan.scope;

    if let Some(kind) = scope.principal_kind() {
        for key in plan
            .recorded
            .iter()
            .map(|p| p.identity_key().as_str())
            .chain(plan.directory.iter().map(String::as_str))
        {
            seed_identity(&remote, kind, key).await;
        }
    }
    for principal in &plan.recorded {
        let remote_id = match scope.principal_kind() {
            Some(kind) => remote.lookup(kind, principal.identity_key().as_str()).await,
            None => Some(principal.identity_key().as_str().into()),
        };
        if let Some(remote_id) = remote_id {
            remote
                .seed_member(&scope, &remote_id, principal.role().cloned())
                .await;
        }
    }

    let reconciler = Reconciler::with_config(remote, plan.config);
    let options = reconciler.options();
    let report = reconciler
        .reconcile(&scope, plan.recorded, plan.desired, &options)
        .await?;

    println!();
    println!("Simulated pass {}:", report.pass_id);
    println!("  Applied: {}", report.summary());
    for change in &report.skipped {
        println!("  Skipped stale: {}", change);
    }
    for principal in &report.created {
        println!("  Created: {}", principal.identity_key());
    }

    let observed = reconciler.observe(&scope).await?;
    println!("Observed membership ({}):", observed.len());
    if scope.tracks_role() {
        for (role, keys) in observed.role_lists() {
            let list = match role.list_name() {
                Some(name) => name,
                None => role.as_str(),
            };
            println!("  {}: {}", list, keys.join(", "));
        }
    } else {
        for principal in observed.iter() {
            println!("  {}", principal);
        }
    }
    Ok(())
}
