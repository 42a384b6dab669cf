//! Translation of a structured solve request into the flat argument list
//! the execution unit consumes.
//!
//! Pure and stateless: the scheduler itself only ever sees the flat list.
//! Token shapes follow the solver's CLI: `N<agents>`, the task and verbosity
//! tokens, optional states-of-the-world selection (`I` or `J<votes>`), the
//! vertex count, the mechanism tokens, and `E2`/`L<limit>` when a positive
//! calculations limit is set.

use serde::Deserialize;

fn default_num_agents() -> u32 {
    3
}

/// Selection of the states of the world the solver enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum StatesType {
    /// Every state; contributes no token.
    #[default]
    #[serde(rename = "all")]
    All,
    /// Increasing states only.
    I,
    /// Bounded number of distinct votes.
    J,
}

/// A mechanism definition, possibly a recursive `mix` of two others.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mechanism {
    /// Mechanism kind token (e.g. `rd`, `pcd`, `qcd`, `dbl`, `mix`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Mix ratio between the right and left mechanisms.
    #[serde(default)]
    pub ratio: Option<f64>,
    #[serde(default)]
    pub left: Option<Box<Mechanism>>,
    #[serde(default)]
    pub right: Option<Box<Mechanism>>,
    /// Lower bound for `qcd`.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Rank exponent for `dbl`.
    #[serde(default)]
    pub exponent: Option<f64>,
}

/// One solver job as submitted by a caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    #[serde(default = "default_num_agents")]
    pub num_agents: u32,
    pub num_vertices: u32,
    /// Task selector token, passed through verbatim.
    pub task: String,
    /// Verbosity token, passed through verbatim.
    pub verbosity: String,
    #[serde(default)]
    pub states_type: StatesType,
    #[serde(default)]
    pub num_distinct_votes: u32,
    /// Cap on solver calculations; 0 means unlimited.
    #[serde(default)]
    pub calculations_limit: u64,
    #[serde(default)]
    pub mechanism: Option<Mechanism>,
}

/// Flatten a mechanism definition into its argument tokens.
///
/// A `mix` expands as: right mechanism, `M<ratio>`, left mechanism.
pub fn mechanism_to_args(mechanism: &Mechanism) -> Vec<String> {
    let mut args = Vec::new();
    push_mechanism(mechanism, &mut args);
    args
}

fn push_mechanism(mechanism: &Mechanism, out: &mut Vec<String>) {
    if mechanism.kind.is_empty() {
        return;
    }

    if mechanism.kind == "mix" {
        if let Some(right) = &mechanism.right {
            push_mechanism(right, out);
        }
        out.push(format!("M{}", mechanism.ratio.unwrap_or(0.0)));
        if let Some(left) = &mechanism.left {
            push_mechanism(left, out);
        }
        return;
    }

    out.push(mechanism.kind.clone());
    if mechanism.kind == "qcd" {
        out.push(mechanism.threshold.unwrap_or(0.0).to_string());
    } else if mechanism.kind == "dbl" {
        out.push(mechanism.exponent.unwrap_or(1.0).to_string());
    }
}

fn states_type_args(request: &SolveRequest) -> Vec<String> {
    match request.states_type {
        StatesType::I => vec!["I".to_string()],
        StatesType::J => vec![format!("J{}", request.num_distinct_votes)],
        StatesType::All => Vec::new(),
    }
}

/// Convert a solve request into the flat argument list.
pub fn request_to_args(request: &SolveRequest) -> Vec<String> {
    let mut args = vec![
        format!("N{}", request.num_agents),
        request.task.clone(),
        request.verbosity.clone(),
    ];
    args.extend(states_type_args(request));
    args.push(request.num_vertices.to_string());
    if let Some(mechanism) = &request.mechanism {
        args.extend(mechanism_to_args(mechanism));
    }
    if request.calculations_limit > 0 {
        args.push("E2".to_string());
        args.push(format!("L{}", request.calculations_limit));
    }
    args
}
