use clap::Parser;
use log::LevelFilter;
use patchgrid::amr::{AmrData, AmrOp};
use patchgrid::config::{GridConfig, LevelSpec};
use patchgrid::context::Context;
use patchgrid::index_space::IndexSpace;
use patchgrid::message::local::run_ranks;
use patchgrid::operator::Laplace;
use patchgrid::point::Point;
use simple_logger::SimpleLogger;




#[derive(Debug, Parser)]
#[clap(version = "0.1", about = "Composite Laplacian on a two-level grid, with and without refluxing")]
struct Opts {
    #[clap(short = 'n', long, default_value = "64")]
    size: i64,

    #[clap(short = 'p', long, default_value = "16")]
    patch_size: i64,

    #[clap(long, default_value = "4")]
    ratio: i64,

    #[clap(short = 'r', long, default_value = "1")]
    ranks: usize,

    #[clap(long)]
    rigid: bool,
}




/**
 * A level refined over the middle quarter of the domain.
 */
fn grid_config(opts: &Opts) -> GridConfig {
    let lo = opts.size * 3 / 8 * opts.ratio;
    let hi = opts.size * 5 / 8 * opts.ratio;

    GridConfig {
        domain_size: Point::ones(opts.size),
        periodic: [!opts.rigid; 2],
        patch_size: Point::ones(opts.patch_size),
        dx: [1.0 / opts.size as f64; 2],
        ratios: vec![Point::ones(opts.ratio)],
        levels: vec![LevelSpec::Tile { region: IndexSpace::new(Point::ones(lo), Point::ones(hi - 1)) }],
    }
}




fn run(context: Context, opts: &Opts) -> Result<(f64, f64), patchgrid::Error> {
    let config = grid_config(opts);
    let grid = config.build(&context)?;
    let mut op: AmrOp<Laplace> = AmrOp::new(&grid, config.dx);
    let mut state = AmrData::new(&grid, 1, op.ghost());
    let mut output = AmrData::new(&grid, 1, Point::zeros());
    let mut uncorrected = AmrData::new(&grid, 1, Point::zeros());
    let tau = 2.0 * std::f64::consts::PI;

    state.initialize(config.dx, |p, dx, values| {
        let x = (p[0] as f64 + 0.5) * dx[0];
        let y = (p[1] as f64 + 0.5) * dx[1];
        values[0] = (tau * x).sin() * (tau * y).cos() + (-40.0 * ((x - 0.5).powi(2) + (y - 0.5).powi(2))).exp()
    });
    op.apply(&mut output, &mut state, None, 1.0);

    for level in 0..grid.num_levels() {
        op.uncorrected_apply(level, &mut uncorrected[level], &state[level], None, 1.0);
    }
    Ok((uncorrected.integrate(config.dx), output.integrate(config.dx)))
}




fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let opts = Opts::parse();
    let (before, after) = if opts.ranks > 1 {
        run_ranks(opts.ranks, |context| run(context, &opts)).remove(0)?
    } else {
        run(Context::serial(), &opts)?
    };

    println!("composite integral without refluxing: {:+.6e}", before);
    println!("composite integral with refluxing:    {:+.6e}", after);
    Ok(())
}
