use std::{collections::HashSet, sync::Arc};

use crate::class::{ClassEntity, ClassId, ClassRc};

fn visit(interface: &ClassRc, seen: &mut HashSet<ClassId>, out: &mut Vec<ClassRc>) {
    if !seen.insert(interface.id()) {
        return;
    }
    out.push(interface.clone());
    for super_interface in interface.direct_interfaces() {
        visit(super_interface, seen, out);
    }
}

/// Collects every interface `class` implements, directly or through an ancestor
///
/// An interface includes itself. The walk is depth-first through super-interfaces along the
/// superclass chain; the result is deduplicated and sorted by descending method count, ties
/// broken by class id, so the interface-table layout is deterministic.
pub(crate) fn collect_interfaces(class: &ClassRc) -> Vec<ClassRc> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    if class.is_interface() {
        visit(class, &mut seen, &mut out);
    } else {
        let mut current: Option<&ClassEntity> = Some(class.as_ref());
        while let Some(cursor) = current {
            for interface in cursor.direct_interfaces() {
                visit(interface, &mut seen, &mut out);
            }
            current = cursor.super_class().map(Arc::as_ref);
        }
    }

    out.sort_by(|a, b| {
        b.interface_methods()
            .count()
            .cmp(&a.interface_methods().count())
            .then_with(|| a.id().cmp(&b.id()))
    });
    out
}
