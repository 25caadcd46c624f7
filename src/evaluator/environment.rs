//! Environments: chains of frames mapping names to mutable locations.
//!
//! A frame is shared by the call that created it and by every closure that
//! captured it, so frames live behind an `Rc`. The unit of mutation is the
//! [`Location`], not the frame: `set` and letrec back-patching overwrite a
//! location in place, and every closure holding the frame sees the change.
//!
//! Frames created by [`Env::extend`] have a fixed set of names. Only the
//! global frame grows, through [`Env::define`].
//!
//! A closure stored in the frame it captured (a recursive `define`, every
//! `letrec`) makes a reference cycle. [`FrameCollector`] finds frames that
//! only such cycles keep alive and clears their bindings.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::value::{Name, Value};

/// A mutable cell holding the value bound to a name
pub type Location = Rc<RefCell<Value>>;

struct Frame {
    bindings: RefCell<HashMap<Name, Location>>,
    parent: Option<Env>,
}

/// Environment for variable bindings. Cloning shares the frames.
#[derive(Clone)]
pub struct Env(Rc<Frame>);

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    /// A single empty frame with no parent
    pub fn new() -> Self {
        Env(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// Find the location of `name`, innermost frame first
    pub fn lookup(&self, name: &str) -> Option<Location> {
        let mut env = Some(self);
        while let Some(Env(frame)) = env {
            if let Some(location) = frame.bindings.borrow().get(name) {
                return Some(Rc::clone(location));
            }
            env = frame.parent.as_ref();
        }
        None
    }

    /// The value currently bound to `name`
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(name).map(|location| location.borrow().clone())
    }

    /// A new environment with one fresh frame on top of this one.
    ///
    /// The caller checks that names are distinct; a repeated name keeps the
    /// last value.
    pub fn extend<I>(&self, bindings: I) -> Env
    where
        I: IntoIterator<Item = (Name, Value)>,
    {
        let frame = bindings
            .into_iter()
            .map(|(name, value)| (name, Rc::new(RefCell::new(value))))
            .collect();
        Env(Rc::new(Frame {
            bindings: RefCell::new(frame),
            parent: Some(self.clone()),
        }))
    }

    /// Overwrite the location found by lookup. Returns false if `name` is unbound.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        match self.lookup(name) {
            Some(location) => {
                *location.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    /// Bind `name` in this frame: overwrite its location if the frame already
    /// has one, otherwise add a new location.
    pub fn define(&self, name: Name, value: Value) {
        let mut bindings = self.0.bindings.borrow_mut();
        match bindings.get(&name) {
            Some(location) => *location.borrow_mut() = value,
            None => {
                bindings.insert(name, Rc::new(RefCell::new(value)));
            }
        }
    }

    /// Drop every binding of this frame
    pub fn clear(&self) {
        drop(self.0.bindings.take());
    }

    /// True if both handles refer to the same frame
    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// All visible bindings, innermost shadowing outer, sorted by name
    pub fn bindings(&self) -> Vec<(Name, Value)> {
        let mut visible: HashMap<Name, Value> = HashMap::new();
        let mut env = Some(self);
        while let Some(Env(frame)) = env {
            for (name, location) in frame.bindings.borrow().iter() {
                visible
                    .entry(Rc::clone(name))
                    .or_insert_with(|| location.borrow().clone());
            }
            env = frame.parent.as_ref();
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl fmt::Debug for Env {
    /// Lists names only: closures stored in a frame refer back to it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<Name> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        write!(f, "Env({names:?}")?;
        if self.0.parent.is_some() {
            write!(f, " -> ..")?;
        }
        write!(f, ")")
    }
}

/// Number of tracked frames that first triggers a collection
pub const MIN_COLLECTION_THRESHOLD: usize = 1024;

/// Releases frames kept alive only by closures stored in frames.
///
/// Frames made by [`Env::extend`] are tracked weakly. A collection counts, for
/// each tracked frame, the strong references held by other tracked frames:
/// parent links and closures owned outright by a binding. Any frame with
/// more references than that is held from outside (a running call, a value
/// in Rust code) and counts as a root, as does the global frame. Tracked
/// frames not reachable from a root are garbage; clearing their bindings
/// breaks the cycles and lets `Rc` free them.
#[derive(Debug)]
pub struct FrameCollector {
    frames: Vec<Weak<Frame>>,
    threshold: usize,
}

impl Default for FrameCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCollector {
    pub fn new() -> Self {
        FrameCollector {
            frames: Vec::new(),
            threshold: MIN_COLLECTION_THRESHOLD,
        }
    }

    pub fn track(&mut self, env: &Env) {
        self.frames.push(Rc::downgrade(&env.0));
    }

    /// Frames tracked since the last collection, plus the survivors of it
    pub fn tracked(&self) -> usize {
        self.frames.len()
    }

    pub fn is_due(&self) -> bool {
        self.frames.len() >= self.threshold
    }

    /// Clear the unreachable tracked frames; returns how many were cleared.
    ///
    /// Nothing is cleared if a binding is borrowed while this runs.
    pub fn collect(&mut self, global: &Env) -> usize {
        let candidates: Vec<Rc<Frame>> =
            self.frames.drain(..).filter_map(|w| w.upgrade()).collect();
        let garbage =
            find_garbage(&candidates, global).unwrap_or_else(|| vec![false; candidates.len()]);

        let released: Vec<HashMap<Name, Location>> = candidates
            .iter()
            .zip(&garbage)
            .filter(|(_, dead)| **dead)
            .map(|(frame, _)| frame.bindings.take())
            .collect();
        let cleared = released.len();
        drop(released);

        self.frames = candidates
            .iter()
            .zip(&garbage)
            .filter(|(_, dead)| !**dead)
            .map(|(frame, _)| Rc::downgrade(frame))
            .collect();
        self.threshold = MIN_COLLECTION_THRESHOLD.max(2 * self.frames.len());
        debug!(live = self.frames.len(), cleared, "frame collection");
        cleared
    }
}

/// Mark which candidates are unreachable, or `None` if a binding is borrowed
fn find_garbage(candidates: &[Rc<Frame>], global: &Env) -> Option<Vec<bool>> {
    let index: HashMap<*const Frame, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, frame)| (Rc::as_ptr(frame), i))
        .collect();

    let mut internal = vec![0usize; candidates.len()];
    for frame in candidates {
        let mut count = |env: &Env| {
            if let Some(&i) = index.get(&Rc::as_ptr(&env.0)) {
                internal[i] += 1;
            }
        };
        if let Some(parent) = &frame.parent {
            count(parent);
        }
        let bindings = frame.bindings.try_borrow().ok()?;
        for location in bindings.values() {
            if Rc::strong_count(location) == 1 {
                let value = location.try_borrow().ok()?;
                closure_envs(&value, Sharing::OwnedOnly, &mut HashSet::new(), &mut count);
            }
        }
    }

    // `candidates` itself holds one reference to each frame
    let mut pending: Vec<Env> = candidates
        .iter()
        .zip(&internal)
        .filter(|&(frame, internal)| Rc::strong_count(frame) > internal + 1)
        .map(|(frame, _)| Env(Rc::clone(frame)))
        .collect();
    pending.push(global.clone());

    let mut reachable = vec![false; candidates.len()];
    let mut seen_frames = HashSet::new();
    let mut seen_values = HashSet::new();
    while let Some(Env(frame)) = pending.pop() {
        if !seen_frames.insert(Rc::as_ptr(&frame)) {
            continue;
        }
        if let Some(&i) = index.get(&Rc::as_ptr(&frame)) {
            reachable[i] = true;
        }
        if let Some(parent) = &frame.parent {
            pending.push(parent.clone());
        }
        let bindings = frame.bindings.try_borrow().ok()?;
        for location in bindings.values() {
            let value = location.try_borrow().ok()?;
            closure_envs(&value, Sharing::All, &mut seen_values, &mut |env| {
                pending.push(env.clone());
            });
        }
    }

    Some(reachable.into_iter().map(|live| !live).collect())
}

/// Which pair cells [`closure_envs`] descends into
#[derive(Clone, Copy)]
enum Sharing {
    /// Only cells with no other owner
    OwnedOnly,
    /// Every cell, each shared cell once
    All,
}

/// Call `visit` with the environment of every closure inside `value`
fn closure_envs(
    value: &Value,
    sharing: Sharing,
    seen: &mut HashSet<*const Value>,
    visit: &mut impl FnMut(&Env),
) {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::Closure { env, .. } => visit(env),
            Value::Pair(car, cdr) => {
                for cell in [car, cdr] {
                    let shared = Rc::strong_count(cell) > 1;
                    let descend = match sharing {
                        Sharing::OwnedOnly => !shared,
                        Sharing::All => !shared || seen.insert(Rc::as_ptr(cell)),
                    };
                    if descend {
                        pending.push(cell);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Exp, Lambda};
    use crate::value::val;

    fn name(s: &str) -> Name {
        Rc::from(s)
    }

    #[test]
    fn test_lookup_innermost_first() {
        let global = Env::new();
        global.define(name("x"), val(1));
        global.define(name("y"), val(10));

        let inner = global.extend([(name("x"), val(2))]);
        assert_eq!(inner.get("x"), Some(val(2)));
        assert_eq!(inner.get("y"), Some(val(10)));
        assert_eq!(global.get("x"), Some(val(1)));
        assert_eq!(inner.get("z"), None);
    }

    #[test]
    fn test_extend_leaves_parent_untouched() {
        let global = Env::new();
        let inner = global.extend([(name("a"), val(1))]);
        assert_eq!(inner.get("a"), Some(val(1)));
        assert_eq!(global.get("a"), None);
        assert!(!inner.ptr_eq(&global));
    }

    #[test]
    fn test_assign_mutates_the_frame_that_holds_the_name() {
        let global = Env::new();
        global.define(name("x"), val(1));
        let inner = global.extend([(name("y"), val(2))]);

        assert!(inner.assign("x", val(5)));
        assert_eq!(global.get("x"), Some(val(5)));

        assert!(inner.assign("y", val(6)));
        assert_eq!(inner.get("y"), Some(val(6)));
        assert_eq!(global.get("y"), None);

        assert!(!inner.assign("nope", val(0)));
    }

    #[test]
    fn test_define_overwrites_location_in_place() {
        let global = Env::new();
        global.define(name("x"), val(1));
        let location = global.lookup("x");
        global.define(name("x"), val(2));

        let location = location.map(|l| l.borrow().clone());
        assert_eq!(location, Some(val(2)));
    }

    #[test]
    fn test_shared_location_sees_later_writes() {
        let global = Env::new();
        let frame = global.extend([(name("f"), Value::Unspecified)]);
        let captured = frame.clone();

        // back-patch through one handle, observe through the other
        assert!(frame.assign("f", val(42)));
        assert_eq!(captured.get("f"), Some(val(42)));
    }

    #[test]
    fn test_bindings_are_sorted_and_shadowed() {
        let global = Env::new();
        global.define(name("b"), val(1));
        global.define(name("a"), val(2));
        let inner = global.extend([(name("b"), val(3))]);

        let names: Vec<(String, Value)> = inner
            .bindings()
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect();
        assert_eq!(
            names,
            vec![("a".to_owned(), val(2)), ("b".to_owned(), val(3))]
        );
    }

    /// A frame binding `f` to a closure over the frame itself
    fn self_referencing_frame(global: &Env) -> Env {
        let frame = global.extend([(name("f"), Value::Unspecified)]);
        let lambda = Rc::new(Lambda {
            formals: vec![],
            body: Exp::Var(name("f")),
        });
        let closure = Value::Closure {
            lambda,
            env: frame.clone(),
        };
        assert!(frame.assign("f", closure));
        frame
    }

    #[test]
    fn test_collect_releases_unreachable_cycles() {
        let global = Env::new();
        let mut collector = FrameCollector::new();
        let frame = self_referencing_frame(&global);
        collector.track(&frame);
        let weak = Rc::downgrade(&frame.0);
        drop(frame);

        assert!(weak.upgrade().is_some());
        assert_eq!(collector.collect(&global), 1);
        assert!(weak.upgrade().is_none());
        assert_eq!(collector.tracked(), 0);
    }

    #[test]
    fn test_collect_keeps_frames_held_from_outside() {
        let global = Env::new();
        let mut collector = FrameCollector::new();
        let held = self_referencing_frame(&global);
        collector.track(&held);

        assert_eq!(collector.collect(&global), 0);
        assert!(held.get("f").is_some_and(|f| f.is_function()));
        assert_eq!(collector.tracked(), 1);
    }

    #[test]
    fn test_collect_keeps_frames_reachable_from_globals() {
        let global = Env::new();
        let mut collector = FrameCollector::new();

        let direct = self_referencing_frame(&global);
        let in_list = self_referencing_frame(&global);
        collector.track(&direct);
        collector.track(&in_list);
        global.define(name("g"), direct.get("f").unwrap_or(Value::Nil));
        let closure = in_list.get("f").unwrap_or(Value::Nil);
        global.define(name("xs"), Value::list([val(1), closure]));
        let weak = [Rc::downgrade(&direct.0), Rc::downgrade(&in_list.0)];
        drop(direct);
        drop(in_list);

        assert_eq!(collector.collect(&global), 0);
        assert!(weak.iter().all(|frame| frame.upgrade().is_some()));

        global.clear();
        assert_eq!(collector.collect(&global), 2);
        assert!(weak.iter().all(|frame| frame.upgrade().is_none()));
    }

    #[test]
    fn test_collect_keeps_parents_of_live_frames() {
        let global = Env::new();
        let mut collector = FrameCollector::new();
        let outer = self_referencing_frame(&global);
        let inner = outer.extend([(name("y"), val(2))]);
        collector.track(&outer);
        collector.track(&inner);
        drop(outer);

        assert_eq!(collector.collect(&global), 0);
        assert!(inner.get("f").is_some_and(|f| f.is_function()));
    }
}
