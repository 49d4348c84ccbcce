//! A human-readable dump of an injector's registrations.

use crate::injector::Injector;
use std::fmt::Write;

/// Renders every registration bag, the exact tokens it serves and its
/// match-all fallback, followed by the instances in the global context.
pub fn registry_report(injector: &Injector) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "--- Fibre Inject Registry Report ---");

  let bags = injector.registered_types();
  if bags.is_empty() {
    let _ = writeln!(out, "\n[Types] No types registered.");
  } else {
    let _ = writeln!(out, "\n[Types] Registered Classes ({}):", bags.len());
    for bag in &bags {
      let _ = writeln!(out, "  {}", bag.class());
      let mut types: Vec<_> = bag.types().collect();
      types.sort_by_key(|(token, _)| token.to_string());
      for (token, registered) in types {
        let _ = writeln!(
          out,
          "    {:<30} -> {} ({})",
          token.to_string(),
          registered.token(),
          registered.strategy()
        );
      }
      if let Some(fallback) = bag.match_all() {
        let _ = writeln!(
          out,
          "    {:<30} -> {} ({})",
          "*",
          fallback.token(),
          fallback.strategy()
        );
      }
    }
  }

  let mut instances: Vec<String> = injector
    .global_instances()
    .into_iter()
    .map(|(token, _)| token.to_string())
    .collect();
  instances.sort();
  if instances.is_empty() {
    let _ = writeln!(out, "\n[Instances] No global instances.");
  } else {
    let _ = writeln!(out, "\n[Instances] Global Instances ({}):", instances.len());
    for token in instances {
      let _ = writeln!(out, "  {}", token);
    }
  }

  let _ = writeln!(out, "\n--- End of Registry Report ---");
  out
}

pub fn print_registry_report(injector: &Injector) {
  print!("{}", registry_report(injector));
}
