use std::collections::BTreeMap;
use std::rc::Rc;

use ir::ir_hasher::HashSet;
use tracing::info;

use crate::class::Class;
use crate::errors::LinkError;
use crate::interface::Interface;
use crate::module::Module;

use super::link_modules;

/// Builds a dispatcher for every interface that at least one class of
/// `module` implements and links the dispatchers into `module`.
///
/// `kind_for_class` is asked at most once per implementing class and must
/// give distinct classes distinct kinds; a repeated kind panics. The
/// dispatchers are emitted into a scratch module on the same context and
/// merged in, so dispatch functions fill the module's declarations of the
/// interface methods.
#[tracing::instrument(skip_all, fields(module = %module.name(), interfaces = interfaces.len()))]
pub fn finalize_interfaces(
    module: &mut Module,
    interfaces: &[Rc<Interface>],
    mut kind_for_class: impl FnMut(&Class) -> u32,
) -> Result<(), LinkError> {
    let mut seen = HashSet::default();
    let interfaces: Vec<&Rc<Interface>> = interfaces.iter().filter(|i| seen.insert(i.id())).collect();

    let mut by_method: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, interface) in interfaces.iter().enumerate() {
        for m in interface.methods() {
            by_method.entry(m.name()).or_default().push(index);
        }
    }

    let mut aux = Module::new("dispatchers", module.context());
    let mut implemented = 0;
    for (_, class) in module.classes() {
        let mut candidates: Vec<usize> = class
            .methods()
            .iter()
            .filter_map(|m| by_method.get(m.name()))
            .flatten()
            .copied()
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let mut class_kind = None;
        for index in candidates {
            let interface = interfaces[index];
            if !class.does_implement(interface) {
                continue;
            }
            let kind = *class_kind.get_or_insert_with(|| kind_for_class(class));
            let dispatcher = aux.get_or_insert_dispatcher(Rc::clone(interface))?;
            aux.insert_implementation(dispatcher, kind, &class.implementation(module.ir()));
            implemented += 1;
        }
    }

    info!(dispatchers = aux.dispatcher_count(), implemented, "finalized interfaces");
    if aux.dispatcher_count() == 0 {
        return Ok(());
    }
    link_modules(module, &aux)
}
