use clap::Parser;
use log::LevelFilter;
use patchgrid::context::{Context, Reduction};
use patchgrid::data::LevelData;
use patchgrid::domain::ProblemDomain;
use patchgrid::index_space::IndexSpace;
use patchgrid::layout::Layout;
use patchgrid::message::local::run_ranks;
use patchgrid::multigrid::{Multigrid, MultigridConfig};
use patchgrid::operator::Laplace;
use patchgrid::point::Point;
use simple_logger::SimpleLogger;
use std::f64::consts::PI;




#[derive(Debug, Parser)]
#[clap(version = "0.1", about = "Multigrid solution of a periodic Poisson problem")]
struct Opts {
    #[clap(short = 'n', long, default_value = "64")]
    size: i64,

    #[clap(short = 'p', long, default_value = "16")]
    patch_size: i64,

    #[clap(short = 'c', long, default_value = "20")]
    cycles: usize,

    #[clap(short = 'r', long, default_value = "1")]
    ranks: usize,

    #[clap(long, default_value = "2")]
    relax: usize,
}




fn exact(x: f64, y: f64) -> f64 {
    (2.0 * PI * x).sin() * (2.0 * PI * y).sin()
}




/**
 * Solve on an n x n grid and return the error max-norm.
 */
fn run(context: &Context, opts: &Opts, n: i64) -> f64 {
    let domain = ProblemDomain::periodic(IndexSpace::cube(n));
    let layout = Layout::new(context, domain, Point::ones(opts.patch_size.min(n)));
    let h = 1.0 / n as f64;
    let center = |p: Point| ((p[0] as f64 + 0.5) * h, (p[1] as f64 + 0.5) * h);

    let mut phi = LevelData::new(&layout, 1, Point::ones(1));
    let mut rhs = LevelData::new(&layout, 1, Point::zeros());
    rhs.initialize(|p, values| {
        let (x, y) = center(p);
        values[0] = -8.0 * PI * PI * exact(x, y)
    });

    let config = MultigridConfig {
        pre_relax: opts.relax,
        post_relax: opts.relax,
        ..MultigridConfig::default()
    };
    let mut mg: Multigrid<Laplace> = Multigrid::new(&layout, [h, h], config);
    let history = mg.solve(&mut phi, &rhs, opts.cycles);

    let mean = phi.sum() / (n * n) as f64;
    let mut error: f64 = 0.0;

    for (index, patch) in phi.iter() {
        for p in layout.patch_space(index) {
            let (x, y) = center(p);
            error = error.max((patch.get(p, 0) - mean - exact(x, y)).abs())
        }
    }
    let error = context.all_reduce_f64(error, Reduction::Max);

    if context.rank() == 0 {
        for (cycle, pair) in history.windows(2).enumerate() {
            println!("n = {:4} cycle {:3}: residual {:.4e} (reduced by {:.2})", n, cycle + 1, pair[1], pair[0] / pair[1]);
        }
        println!("n = {:4} error {:.4e}", n, error);
    }
    error
}




fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let opts = Opts::parse();
    let solve = |context: Context| {
        let coarse = run(&context, &opts, opts.size / 2);
        let fine = run(&context, &opts, opts.size);
        (coarse / fine).log2()
    };

    let order = if opts.ranks > 1 {
        run_ranks(opts.ranks, solve)[0]
    } else {
        solve(Context::serial())
    };
    println!("convergence rate: {:.3}", order);
    Ok(())
}
