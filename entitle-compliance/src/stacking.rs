//! Grouping of entitlements by stacking key, for display.
//!
//! Different entitlement representations store the stacking key and the
//! group name in different places; a [`StackingScheme`] says where.

use crate::certificate::EntitlementCertificate;
use entitle_types::StackId;
use serde_json::Value;
use std::collections::HashMap;

/// Extracts stacking information from one entitlement representation.
pub trait StackingScheme<C: ?Sized> {
    /// The stacking key, or `None` if the entitlement does not stack.
    fn stacking_id(&self, entitlement: &C) -> Option<StackId>;

    /// The name to show for a group started by `entitlement`.
    fn group_name(&self, entitlement: &C) -> Option<String>;
}

/// Entitlements sharing a stacking key, or a single non-stacking one.
#[derive(Debug, Clone, PartialEq)]
pub struct StackGroup<C> {
    /// Group name; `None` for non-stacking entitlements.
    pub name: Option<String>,
    /// Members in encounter order.
    pub entitlements: Vec<C>,
}

impl<C> StackGroup<C> {
    fn new(name: Option<String>, first: C) -> Self {
        Self {
            name,
            entitlements: vec![first],
        }
    }
}

/// Groups `entitlements` by stacking key.
///
/// Groups come out in the order their first member was seen. Entitlements
/// without a stacking key each form their own unnamed group.
pub fn assemble_groups<C, S>(
    entitlements: impl IntoIterator<Item = C>,
    scheme: &S,
) -> Vec<StackGroup<C>>
where
    S: StackingScheme<C> + ?Sized,
{
    let mut groups: Vec<StackGroup<C>> = Vec::new();
    let mut by_stack: HashMap<StackId, usize> = HashMap::new();

    for entitlement in entitlements {
        let stacking_id = scheme
            .stacking_id(&entitlement)
            .filter(|id| !id.as_str().is_empty());

        match stacking_id {
            Some(id) => match by_stack.get(&id) {
                Some(&idx) => groups[idx].entitlements.push(entitlement),
                None => {
                    let name = scheme.group_name(&entitlement);
                    by_stack.insert(id, groups.len());
                    groups.push(StackGroup::new(name, entitlement));
                }
            },
            None => groups.push(StackGroup::new(None, entitlement)),
        }
    }

    groups
}

/// Local entitlement certificates: key and name come from the order.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntitlementCertScheme;

impl StackingScheme<EntitlementCertificate> for EntitlementCertScheme {
    fn stacking_id(&self, cert: &EntitlementCertificate) -> Option<StackId> {
        cert.stacking_id().cloned()
    }

    fn group_name(&self, cert: &EntitlementCertificate) -> Option<String> {
        cert.order_name().map(str::to_string)
    }
}

/// Entitlement JSON from the authority: `pool.stackId` and `pool.productName`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoolJsonScheme;

impl StackingScheme<Value> for PoolJsonScheme {
    fn stacking_id(&self, entitlement: &Value) -> Option<StackId> {
        entitlement
            .pointer("/pool/stackId")
            .and_then(Value::as_str)
            .map(StackId::from)
    }

    fn group_name(&self, entitlement: &Value) -> Option<String> {
        entitlement
            .pointer("/pool/productName")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// A scheme built from two closures.
pub struct FnScheme<K, N> {
    key: K,
    name: N,
}

impl<K, N> FnScheme<K, N> {
    /// Creates a scheme from a key extractor and a name extractor.
    pub fn new(key: K, name: N) -> Self {
        Self { key, name }
    }
}

impl<C, K, N> StackingScheme<C> for FnScheme<K, N>
where
    K: Fn(&C) -> Option<StackId>,
    N: Fn(&C) -> Option<String>,
{
    fn stacking_id(&self, entitlement: &C) -> Option<StackId> {
        (self.key)(entitlement)
    }

    fn group_name(&self, entitlement: &C) -> Option<String> {
        (self.name)(entitlement)
    }
}
