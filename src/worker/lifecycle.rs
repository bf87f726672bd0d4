use color_eyre::{eyre::eyre, Result};

/// Lifecycle state of one interceptor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, nothing run yet
  Parsed,
  Installing,
  /// Installed and waiting to take over
  Installed,
  Activating,
  /// In control of all clients
  Activated,
  /// Install failed; this version will never activate
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

/// Tracks the lifecycle state and the two takeover preferences.
#[derive(Debug)]
pub struct Lifecycle {
  state: WorkerState,
  /// Take over without waiting for old consumers to go away
  skip_waiting: bool,
  /// Control already-open clients without waiting for a reload
  clients_claimed: bool,
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self {
      state: WorkerState::Parsed,
      skip_waiting: false,
      clients_claimed: false,
    }
  }
}

impl Lifecycle {
  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn skip_waiting(&self) -> bool {
    self.skip_waiting
  }

  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed
  }

  pub fn request_skip_waiting(&mut self) {
    self.skip_waiting = true;
  }

  pub fn claim_clients(&mut self) {
    self.clients_claimed = true;
  }

  pub fn begin_install(&mut self) -> Result<()> {
    self.transition(WorkerState::Parsed, WorkerState::Installing)
  }

  pub fn finish_install(&mut self) -> Result<()> {
    self.transition(WorkerState::Installing, WorkerState::Installed)
  }

  pub fn fail_install(&mut self) -> Result<()> {
    self.transition(WorkerState::Installing, WorkerState::Redundant)
  }

  /// Adopt a version whose install completed in an earlier run.
  pub fn resume_installed(&mut self) -> Result<()> {
    self.transition(WorkerState::Parsed, WorkerState::Installed)
  }

  pub fn begin_activate(&mut self) -> Result<()> {
    self.transition(WorkerState::Installed, WorkerState::Activating)
  }

  pub fn finish_activate(&mut self) -> Result<()> {
    self.transition(WorkerState::Activating, WorkerState::Activated)
  }

  /// Store cleanup failed; activation may be retried.
  pub fn fail_activate(&mut self) -> Result<()> {
    self.transition(WorkerState::Activating, WorkerState::Installed)
  }

  fn transition(&mut self, from: WorkerState, to: WorkerState) -> Result<()> {
    if self.state != from {
      return Err(eyre!(
        "Cannot move from {} to {}: worker is {}",
        from,
        to,
        self.state
      ));
    }
    self.state = to;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_happy_path() {
    let mut lifecycle = Lifecycle::default();
    assert_eq!(lifecycle.state(), WorkerState::Parsed);

    lifecycle.begin_install().unwrap();
    lifecycle.finish_install().unwrap();
    assert_eq!(lifecycle.state(), WorkerState::Installed);

    lifecycle.begin_activate().unwrap();
    lifecycle.finish_activate().unwrap();
    assert_eq!(lifecycle.state(), WorkerState::Activated);
  }

  #[test]
  fn test_failed_install_is_redundant() {
    let mut lifecycle = Lifecycle::default();
    lifecycle.begin_install().unwrap();
    lifecycle.fail_install().unwrap();
    assert_eq!(lifecycle.state(), WorkerState::Redundant);
    assert!(lifecycle.begin_activate().is_err());
  }

  #[test]
  fn test_activate_requires_install() {
    let mut lifecycle = Lifecycle::default();
    assert!(lifecycle.begin_activate().is_err());
    assert_eq!(lifecycle.state(), WorkerState::Parsed);
  }

  #[test]
  fn test_install_runs_once() {
    let mut lifecycle = Lifecycle::default();
    lifecycle.begin_install().unwrap();
    lifecycle.finish_install().unwrap();
    assert!(lifecycle.begin_install().is_err());
  }

  #[test]
  fn test_failed_activate_can_retry() {
    let mut lifecycle = Lifecycle::default();
    lifecycle.resume_installed().unwrap();
    lifecycle.begin_activate().unwrap();
    lifecycle.fail_activate().unwrap();
    assert_eq!(lifecycle.state(), WorkerState::Installed);
    lifecycle.begin_activate().unwrap();
  }

  #[test]
  fn test_flags() {
    let mut lifecycle = Lifecycle::default();
    assert!(!lifecycle.skip_waiting());
    assert!(!lifecycle.clients_claimed());
    lifecycle.request_skip_waiting();
    lifecycle.claim_clients();
    assert!(lifecycle.skip_waiting());
    assert!(lifecycle.clients_claimed());
  }
}
