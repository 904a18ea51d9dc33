use super::*;

#[test]
fn test_next_version_starts_from_zero() {
    assert_eq!(next_version(None, BumpKind::Minor).unwrap().to_string(), "0.1.0");
    assert_eq!(next_version(None, BumpKind::Patch).unwrap().to_string(), "0.0.1");
}

#[test]
fn test_next_version_bumps_highest() {
    let highest = Version::parse("1.4.2").unwrap();
    let patch = next_version(Some(&highest), BumpKind::Patch).unwrap();
    assert_eq!(patch.to_string(), "1.4.3");
    let major = next_version(Some(&highest), BumpKind::Major).unwrap();
    assert_eq!(major.to_string(), "2.0.0");
}

#[test]
fn test_next_version_fails_at_component_limit() {
    let highest = Version::parse("1.18446744073709551615.0").unwrap();
    assert!(next_version(Some(&highest), BumpKind::Minor).is_err());
}
