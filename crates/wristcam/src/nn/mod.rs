//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and run on the CPU with [`tract_onnx`].

use std::{borrow::Cow, ops::RangeInclusive, path::Path, sync::Arc};

use tract_onnx::prelude::{
    tvec, DatumType, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, Tensor,
    TypedFact, TypedOp,
};

use crate::image::{Color, Image, Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Neural network loader.
pub struct Loader<'a> {
    model_data: Cow<'a, [u8]>,
}

impl<'a> Loader<'a> {
    fn new(data: Cow<'a, [u8]>) -> Self {
        Self { model_data: data }
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, or if
    /// the network uses unimplemented operations.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let model = SimplePlan::new(graph)?;

        Ok(NeuralNetwork(Arc::new(model)))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<'a, P: AsRef<Path>>(path: P) -> anyhow::Result<Loader<'a>> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl<'a>(path: &Path) -> anyhow::Result<Loader<'a>> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)?;
        Ok(Loader::new(model_data.into()))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Loader<'_>> {
        Ok(Loader::new(raw.into()))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.model().outputs.len()
    }

    /// Returns shape and element type of the input node at `index`.
    pub fn input_info(&self, index: usize) -> anyhow::Result<InputInfo> {
        let fact = self.0.model().input_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .ok_or_else(|| anyhow::anyhow!("network input {index} has a symbolic shape"))?;

        Ok(InputInfo {
            shape: shape.to_vec(),
            datum_type: fact.datum_type,
        })
    }

    /// Runs the network on a set of input tensors, returning the output tensors.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: TVec<Tensor>) -> anyhow::Result<TVec<TValue>> {
        let inputs = inputs
            .into_iter()
            .map(|t| TValue::from_const(Arc::new(t)))
            .collect();
        Ok(self.0.run(inputs)?)
    }
}

/// Information about a neural network input node.
#[derive(Debug, Clone)]
pub struct InputInfo {
    shape: Vec<usize>,
    datum_type: DatumType,
}

impl InputInfo {
    /// Returns the tensor shape for this input.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element type expected by this input.
    #[inline]
    pub fn datum_type(&self) -> DatumType {
        self.datum_type
    }
}

/// A convolutional neural network (CNN) that operates on image data in `[N, H, W, C]` layout.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    input_type: DatumType,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one `[1, H, W, 3]` input of type `f32` or `i32`.
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            anyhow::bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let info = nn.input_info(0)?;
        let (w, h) = match info.shape() {
            [1, h, w, 3] => (*w, *h),
            shape => anyhow::bail!("invalid model input shape for NHWC CNN: {:?}", shape),
        };
        match info.datum_type() {
            DatumType::F32 | DatumType::I32 => {}
            other => anyhow::bail!("unsupported CNN input type {:?}", other),
        }

        let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
        Ok(Self {
            nn,
            input_res: Resolution::new(w, h),
            input_type: info.datum_type(),
            color_mapper,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate(&self, image: &Image) -> anyhow::Result<TVec<TValue>> {
        let tensor = self.image_to_tensor(image)?;
        self.nn.estimate(tvec![tensor])
    }

    fn image_to_tensor(&self, image: &Image) -> anyhow::Result<Tensor> {
        let (w, h) = (
            self.input_res.width() as usize,
            self.input_res.height() as usize,
        );
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let color = image.sample(x as f32 / w as f32, y as f32 / h as f32);
                data.extend(self.color_mapper.map(color));
            }
        }

        let shape = [1, h, w, 3];
        let tensor = match self.input_type {
            DatumType::I32 => {
                let data = data.iter().map(|&v| v.round() as i32).collect::<Vec<_>>();
                Tensor::from_shape(&shape, &data)?
            }
            _ => Tensor::from_shape(&shape, &data)?,
        };
        Ok(tensor)
    }
}

/// Maps sRGB colors to the value range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());

        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        let rgb = [color.r(), color.g(), color.b()];
        rgb.map(|col| col as f32 * adjust_range + start)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn linear_color_map() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        let [r, g, b] = mapper.map(Color::from_rgb8(255, 0, 51));
        assert_relative_eq!(r, 1.0);
        assert_relative_eq!(g, -1.0);
        assert_relative_eq!(b, -0.6);

        let mapper = ColorMapper::linear(0.0..=255.0);
        assert_eq!(mapper.map(Color::from_rgb8(1, 2, 3)), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_non_onnx_path() {
        let err = NeuralNetwork::from_path("model.tflite").err().unwrap();
        assert!(err.to_string().contains(".onnx"), "{err}");
    }
}
