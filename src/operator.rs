use crate::index_space::IndexSpace;
use crate::patch::Patch;
use crate::point::Point;
use crate::DIM;




/**
 * A discretization of an operator of the form
 *
 * `L(u) = diag_scale * D(u) + flux_scale * (div F(u) + S(u))`
 *
 * acting on one patch at a time. Implementors supply the face flux `F`, and
 * optionally a source term `S` and a diagonal term `D`; the divergence and
 * the scaling are provided.
 *
 * The face flux in direction `d` is evaluated on the patch box extended by
 * one on its upper side along `d`; face `i` is the lower face of cell `i`.
 * State data must be available on the patch box grown by `GHOST`, and
 * auxiliary data on the box grown by `AUX_GHOST`.
 */
pub trait PatchOp: Clone + Send + Sync {
    const NUM_STATE: usize;
    const NUM_AUX: usize = 0;
    const GHOST: i64;
    const AUX_GHOST: i64 = 0;
    const HAS_SOURCE: bool = false;
    const HAS_DIAG: bool = false;

    /**
     * The order of the stencil used to interpolate coarse data into the
     * ghost zones of a refined level.
     */
    const INTERP_ORDER: usize = 2;

    fn new(dx: [f64; DIM]) -> Self;

    fn dx(&self) -> [f64; DIM];

    fn flux_scale(&self) -> f64;

    fn diag_scale(&self) -> f64;

    fn set_flux_scale(&mut self, value: f64);

    fn set_diag_scale(&mut self, value: f64);

    /**
     * An estimate of the largest eigenvalue magnitude, for iterative
     * solvers.
     */
    fn spectral_radius(&self) -> f64 {
        1.0
    }

    /**
     * Compute the flux in direction `dir`, over the space of `flux`.
     */
    fn flux(&self, flux: &mut Patch, state: &Patch, aux: Option<&Patch>, dir: usize);

    /**
     * Compute the source term over the space of `source`. Only called when
     * `HAS_SOURCE` is set.
     */
    fn source(&self, _source: &mut Patch, _state: &Patch, _aux: Option<&Patch>) {}

    /**
     * Compute the diagonal term over the space of `diag`. Only called when
     * `HAS_DIAG` is set.
     */
    fn diag(&self, _diag: &mut Patch, _state: &Patch, _aux: Option<&Patch>) {}


    /**
     * Apply the operator over `interior`, writing `scale * L(state)` into
     * the output patch. The fluxes used are left in `fluxes`, which must
     * have one patch per direction, as made by `face_patches`.
     */
    fn apply_with_fluxes(
        &self,
        output: &mut Patch,
        fluxes: &mut [Patch],
        state: &Patch,
        aux: Option<&Patch>,
        interior: &IndexSpace,
        scale: f64,
    ) {
        assert_eq!(fluxes.len(), DIM, "expected one flux patch per direction");

        let dx = self.dx();
        let flux_coef = scale * self.flux_scale();

        for p in interior {
            output.get_slice_mut(p).iter_mut().for_each(|x| *x = 0.0)
        }

        for (dir, flux) in fluxes.iter_mut().enumerate() {
            self.flux(flux, state, aux, dir);
            let e = Point::basis(dir);

            for p in interior {
                for q in 0..Self::NUM_STATE {
                    *output.get_mut(p, q) += flux_coef * (flux.get(p + e, q) - flux.get(p, q)) / dx[dir];
                }
            }
        }

        if Self::HAS_SOURCE {
            let mut source = Patch::zeros(*interior, Self::NUM_STATE);
            self.source(&mut source, state, aux);
            output.axpy(flux_coef, &source);
        }

        if Self::HAS_DIAG {
            let mut diag = Patch::zeros(*interior, Self::NUM_STATE);
            self.diag(&mut diag, state, aux);
            output.axpy(scale * self.diag_scale(), &diag);
        }
    }


    /**
     * Apply the operator over `interior`, discarding the fluxes.
     */
    fn apply(&self, output: &mut Patch, state: &Patch, aux: Option<&Patch>, interior: &IndexSpace, scale: f64) {
        let mut fluxes = face_patches(interior, Self::NUM_STATE);
        self.apply_with_fluxes(output, &mut fluxes, state, aux, interior, scale)
    }
}




/**
 * Allocate one face-centered patch per direction, for the fluxes through
 * the faces of the given cells.
 */
pub fn face_patches(interior: &IndexSpace, num_fields: usize) -> Vec<Patch> {
    (0..DIM)
        .map(|dir| Patch::zeros(interior.extend_upper(1, dir), num_fields))
        .collect()
}




/**
 * The standard second-order Laplacian, `div grad u`, with flux
 * `(u[i] - u[i - e]) / dx` through the lower face of cell `i`.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Laplace {
    dx: [f64; DIM],
    flux_scale: f64,
    diag_scale: f64,
}




// ============================================================================
impl PatchOp for Laplace {
    const NUM_STATE: usize = 1;
    const GHOST: i64 = 1;

    fn new(dx: [f64; DIM]) -> Self {
        assert!(dx.iter().all(|h| *h > 0.0), "grid spacing {:?} must be positive", dx);
        Self {
            dx,
            flux_scale: 1.0,
            diag_scale: 1.0,
        }
    }

    fn dx(&self) -> [f64; DIM] {
        self.dx
    }

    fn flux_scale(&self) -> f64 {
        self.flux_scale
    }

    fn diag_scale(&self) -> f64 {
        self.diag_scale
    }

    fn set_flux_scale(&mut self, value: f64) {
        self.flux_scale = value
    }

    fn set_diag_scale(&mut self, value: f64) {
        self.diag_scale = value
    }

    fn spectral_radius(&self) -> f64 {
        self.dx.iter().map(|h| 4.0 / (h * h)).sum()
    }

    fn flux(&self, flux: &mut Patch, state: &Patch, _aux: Option<&Patch>, dir: usize) {
        let e = Point::basis(dir);
        let h = self.dx[dir];

        for p in flux.space() {
            *flux.get_mut(p, 0) = (state.get(p, 0) - state.get(p - e, 0)) / h;
        }
    }
}
