/// Updates a model's parameters given its gradient.
pub trait Optimizer: Send {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}
