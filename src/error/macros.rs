//! Internal error handling macros.

/// Displays a system error message and aborts the program.
///
/// Use this for broken storage invariants: a table missing where the
/// host-provisioned guarantee says one must exist, a class handle used with
/// the wrong storage, or a lifecycle hook called out of order. The program
/// prints a diagnostic message and immediately aborts without unwinding.
///
/// # Examples
///
/// ```ignore
/// let Some(table) = slots[index].as_mut() else {
///   fatal!("thread has no table for a registered slot");
/// };
/// ```
macro_rules! fatal {
  ($error:expr) => {{
    ::std::eprintln!(
      "{}:{}: (SysInv) a system invariant has been broken: {}",
      ::std::file!(),
      ::std::line!(),
      $error,
    );

    ::std::process::abort();
  }};
}

pub(crate) use fatal;
