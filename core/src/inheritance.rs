//! Handle inheritance directives
//!
//! Windows either copies every inheritable handle of the parent into the child
//! or, through an explicit handle-list attribute on the extended startup
//! information, only the handles named in that list. This module decides which
//! of the two a launch uses. It never creates or closes a handle.

use crate::{CoreError, Result};
use schema::HandleValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which handles the child inherits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InheritanceDirective {
    /// Every inheritable handle in the parent flows to the child
    InheritAll,
    /// Only these standard-stream handles flow to the child
    InheritExactly(Vec<HandleValue>),
}

/// What to do when restriction is requested but unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum InheritancePolicy {
    /// Proceed with all-or-nothing inheritance and report the degradation
    #[default]
    Degrade,
    /// Fail the launch
    Strict,
}

/// Result of deriving the inheritance directive for one launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritancePlan {
    /// The directive to apply
    pub directive: InheritanceDirective,
    /// Whether the extended startup-information structure is needed
    pub extended: bool,
    /// Restriction was requested but could not be honored
    pub degraded: bool,
}

impl InheritancePlan {
    /// The explicit handle list, if the directive restricts inheritance
    pub fn handle_list(&self) -> Option<&[HandleValue]> {
        match &self.directive {
            InheritanceDirective::InheritExactly(handles) => Some(handles),
            InheritanceDirective::InheritAll => None,
        }
    }
}

/// Derives an [`InheritancePlan`] from the resolved standard handles
#[derive(Debug, Clone, Copy)]
pub struct HandleInheritanceAttributeBuilder {
    restriction_supported: bool,
    policy: InheritancePolicy,
}

impl HandleInheritanceAttributeBuilder {
    /// Create a builder for a platform with or without restricted inheritance
    pub fn new(restriction_supported: bool, policy: InheritancePolicy) -> Self {
        Self {
            restriction_supported,
            policy,
        }
    }

    /// Whether a restriction request can fail under this builder's policy
    pub fn rejects_restriction(&self) -> bool {
        !self.restriction_supported && self.policy == InheritancePolicy::Strict
    }

    /// Derive the directive for a launch
    ///
    /// `std_handles` are the three values placed in the child's startup
    /// information, absent slots as `None`. Only those handles ever appear in
    /// an `InheritExactly` directive.
    pub fn build(
        &self,
        close_other_handles: bool,
        std_handles: &[Option<HandleValue>; 3],
    ) -> Result<InheritancePlan> {
        if !close_other_handles {
            return Ok(InheritancePlan {
                directive: InheritanceDirective::InheritAll,
                extended: false,
                degraded: false,
            });
        }

        if !self.restriction_supported {
            if self.policy == InheritancePolicy::Strict {
                return Err(CoreError::InheritanceUnsupported(
                    "the platform has no inheritable-handle list; refusing to inherit all handles"
                        .to_string(),
                ));
            }
            warn!("Restricted handle inheritance unavailable, child may inherit unrelated handles");
            return Ok(InheritancePlan {
                directive: InheritanceDirective::InheritAll,
                extended: false,
                degraded: true,
            });
        }

        let mut handles: Vec<HandleValue> = Vec::with_capacity(3);
        for handle in std_handles.iter().flatten() {
            if !handles.contains(handle) {
                handles.push(*handle);
            }
        }
        debug!("Restricting inheritance to {:?}", handles);

        Ok(InheritancePlan {
            directive: InheritanceDirective::InheritExactly(handles),
            extended: true,
            degraded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: [Option<HandleValue>; 3] = [
        Some(HandleValue(0x44)),
        Some(HandleValue(0x48)),
        Some(HandleValue(0x4c)),
    ];

    #[test]
    fn test_inherit_all_without_restriction() {
        let builder = HandleInheritanceAttributeBuilder::new(true, InheritancePolicy::Degrade);
        let plan = builder.build(false, &H).unwrap();
        assert_eq!(plan.directive, InheritanceDirective::InheritAll);
        assert!(!plan.extended);
        assert!(!plan.degraded);
        assert_eq!(plan.handle_list(), None);
    }

    #[test]
    fn test_inherit_exactly_standard_handles() {
        let builder = HandleInheritanceAttributeBuilder::new(true, InheritancePolicy::Degrade);
        let plan = builder.build(true, &H).unwrap();
        assert!(plan.extended);
        assert_eq!(
            plan.handle_list(),
            Some(&[HandleValue(0x44), HandleValue(0x48), HandleValue(0x4c)][..])
        );
    }

    #[test]
    fn test_absent_slots_and_duplicates_are_skipped() {
        let builder = HandleInheritanceAttributeBuilder::new(true, InheritancePolicy::Strict);
        let handles = [None, Some(HandleValue(8)), Some(HandleValue(8))];
        let plan = builder.build(true, &handles).unwrap();
        assert_eq!(
            plan.directive,
            InheritanceDirective::InheritExactly(vec![HandleValue(8)])
        );
    }

    #[test]
    fn test_unsupported_degrades_by_default() {
        let builder = HandleInheritanceAttributeBuilder::new(false, InheritancePolicy::Degrade);
        let plan = builder.build(true, &H).unwrap();
        assert_eq!(plan.directive, InheritanceDirective::InheritAll);
        assert!(plan.degraded);
        assert!(!plan.extended);
        assert!(!builder.rejects_restriction());
    }

    #[test]
    fn test_unsupported_fails_in_strict_mode() {
        let builder = HandleInheritanceAttributeBuilder::new(false, InheritancePolicy::Strict);
        assert!(builder.rejects_restriction());
        match builder.build(true, &H) {
            Err(CoreError::InheritanceUnsupported(_)) => {}
            other => panic!("expected InheritanceUnsupported, got {:?}", other),
        }
        // Not asking for restriction never fails
        assert!(builder.build(false, &H).is_ok());
    }
}
