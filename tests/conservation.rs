use patchgrid::amr::{AmrData, AmrGrid, AmrOp};
use patchgrid::context::Context;
use patchgrid::domain::ProblemDomain;
use patchgrid::flux_register::RegisterState;
use patchgrid::index_space::{range2d, IndexSpace};
use patchgrid::layout::Layout;
use patchgrid::message::local::run_ranks;
use patchgrid::operator::Laplace;
use patchgrid::point::Point;




const N: i64 = 64;
const RATIO: i64 = 4;

fn solution(x: f64, y: f64) -> f64 {
    (3.0 * x).sin() * y.exp() + x * x - 0.5 * (5.0 * y).cos()
}

fn periodic_solution(x: f64, y: f64) -> f64 {
    let tau = 2.0 * std::f64::consts::PI;
    (tau * x).sin() * (tau * y).cos() + 0.25 * (2.0 * tau * y).sin()
}

/**
 * A 64 x 64 base level in patches of 16, and a level refined by four over
 * the base cells [24, 40) x [24, 40), also in patches of 16.
 */
fn grid(context: &Context, periodic: bool) -> AmrGrid {
    let domain = ProblemDomain::new(IndexSpace::cube(N), [periodic; 2]);
    let ratio = Point::ones(RATIO);
    let base = Layout::new(context, domain, Point::ones(16));
    let fine = Layout::from_region(context, domain.refine(ratio), range2d(96..160, 96..160), Point::ones(16));
    AmrGrid::new(vec![base, fine], vec![ratio]).unwrap()
}

/**
 * The same periodic base level, refined over the base cells
 * [56, 64) + [0, 8) x [24, 40), so the refined patches wrap around the x
 * seam of the domain.
 */
fn seam_grid(context: &Context) -> AmrGrid {
    let domain = ProblemDomain::periodic(IndexSpace::cube(N));
    let ratio = Point::ones(RATIO);
    let base = Layout::new(context, domain, Point::ones(16));
    let points = [14, 15, 0, 1]
        .iter()
        .flat_map(|&i| (6..10).map(move |j| Point::new([i, j])))
        .collect();
    let fine = Layout::from_points(context, domain.refine(ratio), points, Point::ones(16));
    AmrGrid::new(vec![base, fine], vec![ratio]).unwrap()
}

/**
 * Apply the composite Laplacian to the cell-center samples of a function,
 * and return the composite integral of the result together with the
 * largest value of the result.
 */
fn composite_integral<F>(context: &Context, periodic: bool, f: F) -> (f64, f64)
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    integral_on(grid(context, periodic), f)
}

fn integral_on<F>(grid: AmrGrid, f: F) -> (f64, f64)
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    let dx0 = [1.0 / N as f64; 2];
    let mut op: AmrOp<Laplace> = AmrOp::new(&grid, dx0);
    let mut state = AmrData::new(&grid, 1, op.ghost());
    let mut output = AmrData::new(&grid, 1, Point::zeros());

    state.initialize(dx0, |p, dx, values| {
        values[0] = f((p[0] as f64 + 0.5) * dx[0], (p[1] as f64 + 0.5) * dx[1])
    });
    op.apply(&mut output, &mut state, None, 1.0);

    assert_eq!(op.register(0).state(), RegisterState::Refluxed);
    (output.integrate(dx0), output.abs_max())
}

/**
 * The sum of the outward discrete fluxes through the edges of the unit
 * square, times the face length, with ghost values sampled from the
 * function.
 */
fn boundary_flux<F: Fn(f64, f64) -> f64>(f: F) -> f64 {
    let h = 1.0 / N as f64;
    let u = |i: i64, j: i64| f((i as f64 + 0.5) * h, (j as f64 + 0.5) * h);
    let mut total = 0.0;

    for k in 0..N {
        total += (u(N, k) - u(N - 1, k)) - (u(0, k) - u(-1, k));
        total += (u(k, N) - u(k, N - 1)) - (u(k, 0) - u(k, -1));
    }
    total
}




#[test]
fn composite_divergence_vanishes_on_a_periodic_domain() {
    let (integral, magnitude) = composite_integral(&Context::serial(), true, periodic_solution);
    assert!(magnitude > 10.0);
    assert!(integral.abs() < 1e-10, "composite integral {:e}", integral);
}

#[test]
fn composite_divergence_equals_the_outer_boundary_flux() {
    let (integral, _) = composite_integral(&Context::serial(), false, solution);
    let expected = boundary_flux(solution);
    assert!((integral - expected).abs() < 1e-10, "{:e} != {:e}", integral, expected);
}

#[test]
fn conservation_holds_on_three_ranks() {
    let results = run_ranks(3, |context| {
        (
            composite_integral(&context, true, periodic_solution).0,
            composite_integral(&context, false, solution).0,
        )
    });
    let expected = boundary_flux(solution);

    for (periodic, rigid) in results {
        assert!(periodic.abs() < 1e-10);
        assert!((rigid - expected).abs() < 1e-10);
    }
}

#[test]
fn refinement_across_the_periodic_seam_is_conservative() {
    let serial = integral_on(seam_grid(&Context::serial()), periodic_solution);
    let distributed = run_ranks(3, |context| integral_on(seam_grid(&context), periodic_solution));

    for (integral, magnitude) in std::iter::once(serial).chain(distributed) {
        assert!(magnitude > 10.0);
        assert!(integral.abs() < 1e-10, "composite integral {:e}", integral);
    }
}
