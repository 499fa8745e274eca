//! Resource references and ordering
//!
//! Resources refer to each other with `${binding.attribute}`. Those
//! references decide the order of creation (dependencies first) and of
//! deletion (dependents first), and are substituted with known values
//! as resources are refreshed or applied.

use std::collections::{BTreeSet, HashMap, HashSet};

use carina_core::config::BINDING_ATTRIBUTE;
use carina_core::resource::{Resource, Value};

/// Attributes known for each binding, from configuration and state
pub type Bindings = HashMap<String, HashMap<String, Value>>;

pub fn binding_of(resource: &Resource) -> Option<&str> {
    resource
        .attributes
        .get(BINDING_ATTRIBUTE)
        .and_then(Value::as_str)
}

/// Binding names a resource refers to, sorted
pub fn dependencies(resource: &Resource) -> Vec<String> {
    let mut deps = BTreeSet::new();
    for value in resource.attributes.values() {
        collect_refs(value, &mut deps);
    }
    deps.into_iter().collect()
}

fn collect_refs(value: &Value, deps: &mut BTreeSet<String>) {
    match value {
        Value::ResourceRef(binding, _) => {
            deps.insert(binding.clone());
        }
        Value::List(items) => items.iter().for_each(|v| collect_refs(v, deps)),
        Value::Map(map) => map.values().for_each(|v| collect_refs(v, deps)),
        _ => {}
    }
}

/// Order resources so that every resource comes after those it refers to.
/// Declaration order is kept otherwise. Fails on a reference cycle.
pub fn sort_by_dependencies(resources: &[Resource]) -> Result<Vec<Resource>, String> {
    let by_binding: HashMap<&str, &Resource> = resources
        .iter()
        .filter_map(|r| binding_of(r).map(|b| (b, r)))
        .collect();

    let mut sorted = Vec::with_capacity(resources.len());
    let mut done: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();

    fn visit(
        resource: &Resource,
        by_binding: &HashMap<&str, &Resource>,
        done: &mut HashSet<String>,
        path: &mut Vec<String>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), String> {
        let key = resource.id.to_string();
        if done.contains(&key) {
            return Ok(());
        }
        if path.contains(&key) {
            path.push(key);
            return Err(format!("Dependency cycle: {}", path.join(" -> ")));
        }

        path.push(key.clone());
        for dep in dependencies(resource) {
            if let Some(target) = by_binding.get(dep.as_str()) {
                visit(target, by_binding, done, path, sorted)?;
            }
        }
        path.pop();

        done.insert(key);
        sorted.push(resource.clone());
        Ok(())
    }

    for resource in resources {
        visit(resource, &by_binding, &mut done, &mut path, &mut sorted)?;
    }
    Ok(sorted)
}

/// Order `(key, depends_on)` pairs for deletion: anything that depends on
/// a binding is deleted before it. `key` is the binding name.
pub fn deletion_order(entries: &[(String, Vec<String>)]) -> Vec<String> {
    let known: HashSet<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    let mut remaining: Vec<&(String, Vec<String>)> = entries.iter().collect();
    let mut order = Vec::with_capacity(entries.len());

    while !remaining.is_empty() {
        // Deletable once nothing left still depends on it
        let (ready, blocked): (Vec<&&(String, Vec<String>)>, Vec<_>) = remaining.iter().partition(|(key, _)| {
            !remaining
                .iter()
                .any(|(_, deps)| deps.iter().any(|d| d == key && known.contains(d.as_str())))
        });
        if ready.is_empty() {
            // A cycle left in state; fall back to reverse name order
            let mut rest: Vec<String> = blocked.iter().map(|(k, _)| k.clone()).collect();
            rest.sort_by(|a, b| b.cmp(a));
            order.extend(rest);
            break;
        }
        let mut ready: Vec<String> = ready.iter().map(|(k, _)| k.clone()).collect();
        ready.sort_by(|a, b| b.cmp(a));
        order.extend(ready);
        remaining = blocked.into_iter().copied().collect();
    }
    order
}

/// Replace references whose target attribute is known
pub fn resolve(value: &Value, bindings: &Bindings) -> Value {
    resolve_depth(value, bindings, 0)
}

fn resolve_depth(value: &Value, bindings: &Bindings, depth: usize) -> Value {
    match value {
        Value::ResourceRef(binding, attr) => match bindings.get(binding).and_then(|a| a.get(attr)) {
            Some(found) if depth < 16 => resolve_depth(found, bindings, depth + 1),
            _ => value.clone(),
        },
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| resolve_depth(v, bindings, depth))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_depth(v, bindings, depth)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

pub fn resolve_resource(resource: &Resource, bindings: &Bindings) -> Resource {
    let mut resolved = resource.clone();
    resolved.attributes = resource
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), resolve(v, bindings)))
        .collect();
    resolved
}

/// Record what is known about a binding; configured values win over
/// reported ones
pub fn bind(bindings: &mut Bindings, resource: &Resource, reported: &HashMap<String, Value>) {
    let Some(binding) = binding_of(resource) else {
        return;
    };
    let mut attrs = reported.clone();
    for (k, v) in &resource.attributes {
        if !v.is_unresolved() {
            attrs.insert(k.clone(), v.clone());
        }
    }
    bindings.insert(binding.to_string(), attrs);
}

/// First reference still unresolved in a resource, as `binding.attribute`
pub fn first_unresolved(resource: &Resource) -> Option<String> {
    fn find(value: &Value) -> Option<String> {
        match value {
            Value::ResourceRef(b, a) => Some(format!("{}.{}", b, a)),
            Value::List(items) => items.iter().find_map(find),
            Value::Map(map) => map.values().find_map(find),
            _ => None,
        }
    }
    let mut keys: Vec<&String> = resource.attributes.keys().collect();
    keys.sort();
    keys.into_iter()
        .find_map(|k| resource.attributes.get(k).and_then(find))
}
