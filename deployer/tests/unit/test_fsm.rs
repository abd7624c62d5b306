//! FSM unit tests

use modeldeploy::deploy::fsm::{DeploymentFsm, DeploymentStatus};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.status(), DeploymentStatus::Queued);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Queued -> Deploying
    fsm.transition(DeploymentStatus::Deploying).unwrap();
    assert_eq!(fsm.status(), DeploymentStatus::Deploying);

    // Deploying -> Starting
    fsm.transition(DeploymentStatus::Starting).unwrap();
    assert_eq!(fsm.status(), DeploymentStatus::Starting);

    // Starting -> Active
    fsm.transition(DeploymentStatus::Active).unwrap();
    assert_eq!(fsm.status(), DeploymentStatus::Active);
    assert_eq!(fsm.status().progress(), 100);
}

#[test]
fn test_fsm_deploy_failure_flow() {
    let mut fsm = DeploymentFsm::new();

    fsm.transition(DeploymentStatus::Deploying).unwrap();
    fsm.transition(DeploymentStatus::Starting).unwrap();
    fsm.fail("container exited").unwrap();

    assert_eq!(fsm.status(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("container exited"));
}

#[test]
fn test_fsm_operator_changes_only_from_active() {
    for status in [
        DeploymentStatus::Queued,
        DeploymentStatus::Deploying,
        DeploymentStatus::Starting,
        DeploymentStatus::Failed,
        DeploymentStatus::Stopped,
    ] {
        let mut fsm = DeploymentFsm::from_status(status);
        assert!(fsm.transition(DeploymentStatus::Stopped).is_err(), "{}", status);
        assert!(fsm.transition(DeploymentStatus::Deleted).is_err(), "{}", status);
    }

    let mut fsm = DeploymentFsm::from_status(DeploymentStatus::Active);
    fsm.transition(DeploymentStatus::Deleted).unwrap();
    assert_eq!(fsm.status().progress(), 0);
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot become active without starting
    let result = fsm.transition(DeploymentStatus::Active);
    assert!(result.is_err());
    assert_eq!(fsm.status(), DeploymentStatus::Queued);
}
