//! End-to-end feasibility scenarios for the modular simplex solver.

use fixplex::{Config, Feasibility, Fixplex, PivotStrategy, Statistics, Var};

fn solver8() -> Fixplex<u8> {
    Fixplex::new(Config::default())
}

#[test]
fn conflict_chain_without_branching() {
    // x <= y, y <= z, z < x is unsatisfiable at any width; the core must
    // name exactly the three inequality tokens.
    let mut s: Fixplex<u32> = Fixplex::new(Config::default());
    let (x, y, z) = (Var(0), Var(1), Var(2));
    s.add_ineq(x, y, 10, false);
    s.add_ineq(y, z, 11, false);
    s.add_ineq(z, x, 12, true);
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    let mut core = s.unsat_core().to_vec();
    core.sort_unstable();
    assert_eq!(core, vec![10, 11, 12]);
}

#[test]
fn nonstrict_cycle_is_not_a_conflict() {
    // x <= y <= z <= x only forces equality.
    let mut s: Fixplex<u32> = Fixplex::new(Config::default());
    let (x, y, z) = (Var(0), Var(1), Var(2));
    s.add_ineq(x, y, 1, false);
    s.add_ineq(y, z, 2, false);
    s.add_ineq(z, x, 3, false);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
}

#[test]
fn pivot_round_trip() {
    // 3x + 5y == 0 (mod 256) with x in [2, 4): the base variable must be
    // pivoted to a value inside its bounds with the row still balanced.
    let mut s = solver8();
    let (x, y) = (Var(0), Var(1));
    s.add_row(x, &[(x, 3), (y, 5)]);
    s.set_bounds(x, 2, 4, 1);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    let (xv, yv) = (s.value(x), s.value(y));
    assert!((2..4).contains(&xv));
    assert_eq!(xv.wrapping_mul(3).wrapping_add(yv.wrapping_mul(5)), 0);
}

#[test]
fn even_coefficient_parity_conflict() {
    // 2x + y == 0 with y fixed at 3: 2x == 253 has no solution mod 256.
    let mut s = solver8();
    let (x, y) = (Var(0), Var(1));
    s.add_row(x, &[(x, 2), (y, 1)]);
    s.set_bounds(y, 3, 4, 42);
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    assert_eq!(s.unsat_core(), &[42]);
}

#[test]
fn even_coefficient_solvable() {
    // 2x + y == 0 with y fixed at an even value is solvable.
    let mut s = solver8();
    let (x, y) = (Var(0), Var(1));
    s.add_row(x, &[(x, 2), (y, 1)]);
    s.set_bounds(y, 6, 7, 1);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    let (xv, yv) = (s.value(x), s.value(y));
    assert_eq!(yv, 6);
    assert_eq!(xv.wrapping_mul(2).wrapping_add(yv), 0);
}

#[test]
fn push_pop_restores_bounds_and_deps() {
    let mut s = solver8();
    let x = Var(0);
    s.set_bounds(x, 0, 10, 1);
    s.push();
    s.set_bounds(x, 0, 5, 2);
    assert_eq!((s.bounds(x).lo, s.bounds(x).hi), (0, 5));
    s.pop(1);
    assert_eq!((s.bounds(x).lo, s.bounds(x).hi), (0, 10));
    // The restored hi dependency must be the level-0 token, not the popped
    // one: a conflict against the restored bound names tokens 1 and 3.
    s.set_bounds(x, 20, 30, 3);
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    let mut core = s.unsat_core().to_vec();
    core.sort_unstable();
    assert_eq!(core, vec![1, 3]);
}

#[test]
fn push_pop_removes_rows_and_ineqs() {
    let mut s = solver8();
    let (x, y) = (Var(0), Var(1));
    s.set_value(x, 5, 1);
    s.push();
    s.add_row(y, &[(x, 1), (y, 1)]);
    s.set_value(y, 7, 2); // x + y == 12 != 0: infeasible
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    s.pop(1);
    // Row and y's bounds are gone; x's survive.
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    assert_eq!(s.value(x), 5);

    s.push();
    s.add_ineq(x, y, 3, true);
    s.set_value(y, 2, 4); // 5 < 2 is false and 5 in [5,6), 2 in [2,3): conflict
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    s.pop(1);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
}

#[test]
fn wrap_around_inequality_tightens_both_sides() {
    // v in [254, 2) (i.e. {254, 255, 0, 1}), w in [0, 3), v < w.
    // Propagation must conclude v in [0, 2) and w in [1, 3).
    let mut s = solver8();
    let (v, w) = (Var(0), Var(1));
    s.set_bounds(v, 254, 2, 5);
    s.set_bounds(w, 0, 3, 6);
    s.add_ineq(v, w, 7, true);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    assert_eq!((s.bounds(v).lo, s.bounds(v).hi), (0, 2));
    assert_eq!((s.bounds(w).lo, s.bounds(w).hi), (1, 3));
    assert!(s.value(v) < s.value(w));
}

#[test]
fn inconsistent_bounds_conflict() {
    let mut s = solver8();
    let x = Var(0);
    s.set_bounds(x, 0, 5, 1);
    s.set_bounds(x, 10, 20, 2);
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    let mut core = s.unsat_core().to_vec();
    core.sort_unstable();
    assert_eq!(core, vec![1, 2]);
}

#[test]
fn strict_needs_room() {
    // v < w with w fixed at 0 is a conflict on its own.
    let mut s = solver8();
    let (v, w) = (Var(0), Var(1));
    s.set_value(w, 0, 9);
    s.add_ineq(v, w, 8, true);
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    let core = s.unsat_core().to_vec();
    assert!(core.contains(&8) && core.contains(&9), "core {core:?}");
}

#[test]
fn infeasible_row_core_collects_row_bounds() {
    // x + y == 0 with x fixed 5 and y fixed 7: interval sum misses zero.
    let mut s = solver8();
    let (x, y) = (Var(0), Var(1));
    s.add_row(x, &[(x, 1), (y, 1)]);
    s.set_value(x, 5, 21);
    s.set_value(y, 7, 22);
    assert_eq!(s.make_feasible(), Feasibility::Infeasible);
    let mut core = s.unsat_core().to_vec();
    core.sort_unstable();
    assert_eq!(core, vec![21, 22]);
}

#[test]
fn multi_row_chain_feasible() {
    // x + y == 0, y + z == 0, x in [1, 2): forces y = -1, z = 1.
    let mut s = solver8();
    let (x, y, z) = (Var(0), Var(1), Var(2));
    s.add_row(x, &[(x, 1), (y, 1)]);
    s.add_row(z, &[(y, 1), (z, 1)]);
    s.set_bounds(x, 1, 2, 1);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    assert_eq!(s.value(x), 1);
    assert_eq!(s.value(y), 255);
    assert_eq!(s.value(z), 1);
}

#[test]
fn bland_fallback_terminates() {
    // Aggressive threshold so Bland's rule engages almost immediately;
    // the solver must still terminate and stay consistent on a system
    // with several interacting rows and narrow bounds.
    let config = Config {
        blands_rule_threshold: 1,
        max_iterations: 10_000,
        pivot_strategy: PivotStrategy::GreatestError,
        seed: 7,
    };
    let mut s: Fixplex<u8> = Fixplex::new(config);
    let (x, y, z, u) = (Var(0), Var(1), Var(2), Var(3));
    s.add_row(x, &[(x, 1), (y, 3), (z, 5)]);
    s.add_row(u, &[(u, 1), (y, 7), (z, 1)]);
    s.set_bounds(x, 1, 3, 1);
    s.set_bounds(u, 2, 6, 2);
    s.set_bounds(y, 0, 50, 3);
    s.set_bounds(z, 0, 50, 4);
    let verdict = s.make_feasible();
    if verdict == Feasibility::Feasible {
        assert!(s.is_feasible());
        let (xv, yv, zv, uv) = (s.value(x), s.value(y), s.value(z), s.value(u));
        assert_eq!(xv.wrapping_add(yv.wrapping_mul(3)).wrapping_add(zv.wrapping_mul(5)), 0);
        assert_eq!(uv.wrapping_add(yv.wrapping_mul(7)).wrapping_add(zv), 0);
    }
}

#[test]
fn iteration_cap_yields_unknown() {
    let config = Config { max_iterations: 0, ..Config::default() };
    let mut s: Fixplex<u8> = Fixplex::new(config);
    let (x, y, z, w) = (Var(0), Var(1), Var(2), Var(3));
    s.add_row(x, &[(x, 1), (y, 1)]);
    s.add_row(z, &[(z, 1), (w, 1)]);
    s.set_bounds(x, 1, 2, 1);
    s.set_bounds(z, 1, 2, 2);
    // Two patches are required but the cap allows only one iteration.
    assert_eq!(s.make_feasible(), Feasibility::Unknown);
}

#[test]
fn cancellation_yields_unknown() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    let mut s = solver8();
    let flag = Arc::new(AtomicBool::new(false));
    s.set_cancel_flag(flag.clone());
    let (x, y) = (Var(0), Var(1));
    s.add_row(x, &[(x, 1), (y, 1)]);
    s.set_bounds(x, 1, 2, 1);
    flag.store(true, Ordering::Relaxed);
    assert_eq!(s.make_feasible(), Feasibility::Unknown);
}

#[test]
fn fixed_value_equality_detected() {
    // x + y == 0 and u + w == 0 with y, w fixed to the same value: bound
    // propagation fixes x and u to the same value and reports x == u.
    let mut s = solver8();
    let (x, y, u, w) = (Var(0), Var(1), Var(2), Var(3));
    s.add_row(x, &[(x, 1), (y, 1)]);
    s.add_row(u, &[(u, 1), (w, 1)]);
    s.set_value(y, 9, 1);
    s.set_value(w, 9, 2);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    assert_eq!(s.propagate_bounds(), Feasibility::Feasible);
    let eqs = s.var_eqs();
    assert!(
        eqs.iter().any(|e| (e.x == x && e.y == u) || (e.x == u && e.y == x)),
        "expected x == u among {eqs:?}"
    );
}

#[test]
fn statistics_report_counters() {
    let mut s = solver8();
    let (x, y) = (Var(0), Var(1));
    s.add_row(x, &[(x, 3), (y, 5)]);
    s.set_bounds(x, 2, 4, 1);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    let mut st = Statistics::default();
    s.collect_statistics(&mut st);
    assert_eq!(st.get("num checks"), 1);
    assert!(st.get("num pivots") >= 1);
    assert_eq!(st.get("num infeasible"), 0);
}

#[test]
fn set_value_roundtrip_observers() {
    let mut s = solver8();
    let x = Var(0);
    s.set_value(x, 200, 1);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
    assert_eq!(s.value(x), 200);
    assert!(s.bounds(x).is_fixed());
    assert!(s.bounds(x).contains(200));
}

#[test]
fn reset_clears_state() {
    let mut s = solver8();
    let x = Var(0);
    s.set_bounds(x, 3, 4, 1);
    s.reset();
    assert_eq!(s.num_vars(), 0);
    assert_eq!(s.make_feasible(), Feasibility::Feasible);
}
