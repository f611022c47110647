use std::path::{Path, PathBuf};

use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, Driver, DriverManager, Metadata};
use log::{debug, info};
use ndarray::Array2;

use super::{Georeference, OutputSpec, RasterBackend, RasterSink, RasterSource};
use crate::creation::CreationOptions;
use crate::error::{ReclassifyError, Result};
use crate::pixel::PixelType;
use crate::tiling::Window;

/// GeoTIFF rasters through GDAL.
#[derive(Debug, Clone, Default)]
pub struct GdalBackend {
    options: CreationOptions,
}

impl GdalBackend {
    pub fn new(options: CreationOptions) -> Self {
        Self { options }
    }
}

impl RasterBackend for GdalBackend {
    type Source = GdalSource;
    type Sink = GdalSink;

    fn open(&self, path: &Path) -> Result<GdalSource> {
        debug!("Opening source raster: {}", path.display());
        let dataset = Dataset::open(path).map_err(|e| ReclassifyError::SourceUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let (width, height) = dataset.raster_size();
        if width == 0 || height == 0 {
            return Err(ReclassifyError::InvalidExtent(width, height));
        }

        Ok(GdalSource {
            dataset,
            path: path.to_path_buf(),
        })
    }

    fn create(&self, path: &Path, spec: &OutputSpec) -> Result<GdalSink> {
        info!(
            "Creating output raster: {} ({}x{}, {} band(s), {})",
            path.display(),
            spec.width,
            spec.height,
            spec.band_count(),
            spec.dtype
        );

        let unwritable = |reason: String| ReclassifyError::DestinationUnwritable {
            path: path.to_path_buf(),
            reason,
        };

        let driver =
            DriverManager::get_driver_by_name("GTiff").map_err(|e| unwritable(e.to_string()))?;

        let mut gdal_options = CslStringList::new();
        for opt in self.options.to_options() {
            gdal_options.add_string(&opt)?;
        }

        let mut dataset = create_dataset(&driver, path, spec, &gdal_options)
            .map_err(|e| unwritable(e.to_string()))?;

        if let Some(georeference) = &spec.georeference {
            dataset.set_geo_transform(&georeference.geotransform)?;
            if !georeference.projection.is_empty() {
                dataset.set_projection(&georeference.projection)?;
            }
        }

        for (i, name) in spec.band_names.iter().enumerate() {
            let mut raster_band = dataset.rasterband(i + 1)?;
            if !name.is_empty() {
                raster_band.set_description(name)?;
            }
            if let Some(nodata) = spec.nodata {
                raster_band.set_no_data_value(Some(nodata))?;
            }
        }

        Ok(GdalSink {
            dataset,
            path: path.to_path_buf(),
        })
    }
}

fn create_dataset(
    driver: &Driver,
    path: &Path,
    spec: &OutputSpec,
    options: &CslStringList,
) -> gdal::errors::Result<Dataset> {
    fn typed<T: GdalType>(
        driver: &Driver,
        path: &Path,
        spec: &OutputSpec,
        options: &CslStringList,
    ) -> gdal::errors::Result<Dataset> {
        driver.create_with_band_type_with_options::<T, _>(
            path,
            spec.width,
            spec.height,
            spec.band_count(),
            options,
        )
    }

    match spec.dtype {
        PixelType::UInt8 => typed::<u8>(driver, path, spec, options),
        // Int8 bands need GDAL 3.7; store them as Int16.
        PixelType::Int8 | PixelType::Int16 => typed::<i16>(driver, path, spec, options),
        PixelType::UInt16 => typed::<u16>(driver, path, spec, options),
        PixelType::UInt32 => typed::<u32>(driver, path, spec, options),
        PixelType::Int32 => typed::<i32>(driver, path, spec, options),
        PixelType::Float32 => typed::<f32>(driver, path, spec, options),
        PixelType::Float64 => typed::<f64>(driver, path, spec, options),
    }
}

/// A read-only dataset handle. One per worker: GDAL handles are not `Sync`.
pub struct GdalSource {
    dataset: Dataset,
    path: PathBuf,
}

impl RasterSource for GdalSource {
    fn dimensions(&self) -> (usize, usize) {
        self.dataset.raster_size()
    }

    fn band_count(&self) -> usize {
        self.dataset.raster_count() as usize
    }

    fn dtype(&self, band: usize) -> Result<PixelType> {
        let rasterband = self.dataset.rasterband(band)?;
        PixelType::from_gdal(rasterband.band_type())
    }

    fn nodata(&self, band: usize) -> Result<Option<f64>> {
        Ok(self.dataset.rasterband(band)?.no_data_value())
    }

    fn block_size(&self, band: usize) -> Option<(usize, usize)> {
        self.dataset
            .rasterband(band)
            .ok()
            .map(|rasterband| rasterband.block_size())
    }

    fn georeference(&self) -> Option<Georeference> {
        let geotransform = self.dataset.geo_transform().ok()?;
        Some(Georeference {
            geotransform,
            projection: self.dataset.projection(),
        })
    }

    fn read(&self, band: usize, window: &Window) -> Result<Array2<f64>> {
        let (width, height) = self.dimensions();
        if !window.fits_within(width, height) {
            return Err(ReclassifyError::WindowOutOfBounds {
                window: *window,
                width,
                height,
            });
        }

        let rasterband = self.dataset.rasterband(band)?;
        debug!(
            "Reading window {} of band {} from {}",
            window,
            band,
            self.path.display()
        );

        let buffer = rasterband.read_as::<f64>(
            (window.col_off as isize, window.row_off as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )?;

        let data_vec: Vec<f64> = buffer.into_iter().collect();
        let data = Array2::from_shape_vec(window.shape(), data_vec)?;
        Ok(data)
    }
}

/// The single writable handle of a destination raster.
pub struct GdalSink {
    dataset: Dataset,
    path: PathBuf,
}

impl RasterSink for GdalSink {
    fn write(&mut self, band: usize, window: &Window, buffer: &Array2<f64>) -> Result<()> {
        if buffer.dim() != window.shape() {
            return Err(ReclassifyError::InvalidParameter(format!(
                "buffer {:?} does not match window {}",
                buffer.dim(),
                window
            )));
        }

        let mut raster_band = self.dataset.rasterband(band)?;
        // GDAL converts f64 to the band's storage type on write.
        let mut gdal_buffer =
            Buffer::new((window.width, window.height), buffer.iter().copied().collect());

        raster_band.write(
            (window.col_off as isize, window.row_off as isize),
            (window.width, window.height),
            &mut gdal_buffer,
        )?;

        debug!(
            "Wrote window {} to band {} of {}",
            window,
            band,
            self.path.display()
        );
        Ok(())
    }

    fn finish(self) -> Result<()> {
        // GDALClose writes the last compressed blocks.
        self.dataset
            .close()
            .map_err(|e| ReclassifyError::DestinationUnwritable {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        info!("Closed output raster: {}", self.path.display());
        Ok(())
    }
}

#[cfg(all(test, feature = "gdal"))]
mod tests {
    use super::*;
    use crate::coordinator::{run, Destination, EngineConfig, JobResult, ReclassificationJob};
    use crate::table::{LookupTable, TableRow};
    use gdal::raster::GdalDataType;

    const NODATA: f64 = -9999.0;
    const GEOTRANSFORM: [f64; 6] = [500000.0, 30.0, 0.0, 4200000.0, 0.0, -30.0];

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "geotiff_reclassify_{}_{}.tif",
            std::process::id(),
            name
        ))
    }

    /// 8x6 Int16 raster cycling through 1, 2, 3 with a nodata corner.
    fn source_data() -> Array2<f64> {
        let mut data = Array2::from_shape_fn((6, 8), |(r, c)| ((r * 8 + c) % 3 + 1) as f64);
        data[[0, 0]] = NODATA;
        data
    }

    fn write_source(path: &Path) {
        let data = source_data();
        let (height, width) = data.dim();
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver
            .create_with_band_type::<i16, _>(path, width, height, 1)
            .unwrap();
        dataset.set_geo_transform(&GEOTRANSFORM).unwrap();
        let mut band = dataset.rasterband(1).unwrap();
        band.set_no_data_value(Some(NODATA)).unwrap();
        let mut buffer = Buffer::new((width, height), data.iter().copied().collect());
        band.write((0, 0), (width, height), &mut buffer).unwrap();
    }

    fn read_band(path: &Path, band: usize) -> (Dataset, Array2<f64>) {
        let dataset = Dataset::open(path).unwrap();
        let (width, height) = dataset.raster_size();
        let buffer = dataset
            .rasterband(band)
            .unwrap()
            .read_as::<f64>((0, 0), (width, height), (width, height), None)
            .unwrap();
        let data = Array2::from_shape_vec((height, width), buffer.into_iter().collect()).unwrap();
        (dataset, data)
    }

    fn soils() -> LookupTable {
        LookupTable::build(
            vec!["di".to_string()],
            vec![
                TableRow { key: 1, values: vec![70000.0] },
                TableRow { key: 2, values: vec![5.0] },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_read_window_at_offset() {
        let path = temp_path("read_offset");
        write_source(&path);

        let source = GdalBackend::default().open(&path).unwrap();
        assert_eq!(source.dimensions(), (8, 6));
        assert_eq!(source.band_count(), 1);
        assert_eq!(source.dtype(1).unwrap(), PixelType::Int16);
        assert_eq!(source.nodata(1).unwrap(), Some(NODATA));

        let window = Window::new(2, 1, 3, 2);
        let buffer = source.read(1, &window).unwrap();
        let expected = source_data().slice(ndarray::s![1..3, 2..5]).to_owned();
        assert_eq!(buffer, expected);

        let outside = Window::new(6, 0, 3, 1);
        assert!(matches!(
            source.read(1, &outside),
            Err(ReclassifyError::WindowOutOfBounds { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_reclassify_to_geotiff() {
        let src = temp_path("job_src");
        let dst = temp_path("job_dst_di");
        write_source(&src);

        let table = soils();
        let mut job = ReclassificationJob::new(&src, &table, "di");
        job.destination = Destination::PerField(vec![dst.clone()]);
        let config = EngineConfig {
            workers: 2,
            windows_per_axis: 3,
            align_to_blocks: false,
        };

        let result = run(&GdalBackend::default(), &job, &config).unwrap();
        match result {
            JobResult::Written { outputs, windows } => {
                assert_eq!(outputs, vec![dst.clone()]);
                assert_eq!(windows, 12);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let (dataset, data) = read_band(&dst, 1);
        let band = dataset.rasterband(1).unwrap();
        // 70000 does not fit Int16.
        assert_eq!(band.band_type(), GdalDataType::Int32);
        assert_eq!(band.description().unwrap(), "di");
        assert_eq!(band.no_data_value(), Some(NODATA));
        assert_eq!(dataset.geo_transform().unwrap(), GEOTRANSFORM);

        let expected = source_data().mapv(|v| match v as i64 {
            1 => 70000.0,
            2 => 5.0,
            _ => v,
        });
        assert_eq!(data, expected);

        let _ = std::fs::remove_file(&src);
        let _ = std::fs::remove_file(&dst);
    }

    #[test]
    fn test_multiband_descriptions() {
        let src = temp_path("multi_src");
        let dst = temp_path("multi_dst");
        write_source(&src);

        let table = LookupTable::build(
            vec!["di".to_string(), "pi".to_string()],
            vec![TableRow { key: 3, values: vec![0.5, 7.0] }],
        )
        .unwrap();
        let mut job = ReclassificationJob::new(&src, &table, "di");
        job.fields = vec!["di".to_string(), "pi".to_string()];
        job.destination = Destination::Multiband(dst.clone());
        let config = EngineConfig {
            workers: 1,
            windows_per_axis: 2,
            align_to_blocks: false,
        };
        run(&GdalBackend::default(), &job, &config).unwrap();

        let (dataset, di) = read_band(&dst, 1);
        let (_, pi) = read_band(&dst, 2);
        assert_eq!(dataset.raster_count(), 2);
        assert_eq!(dataset.rasterband(1).unwrap().description().unwrap(), "di");
        assert_eq!(dataset.rasterband(2).unwrap().description().unwrap(), "pi");
        assert_eq!(
            dataset.rasterband(1).unwrap().band_type(),
            GdalDataType::Float32
        );
        assert_eq!(di[[0, 2]], 0.5);
        assert_eq!(pi[[0, 2]], 7.0);
        assert_eq!(pi[[0, 0]], NODATA);

        let _ = std::fs::remove_file(&src);
        let _ = std::fs::remove_file(&dst);
    }

    #[test]
    fn test_open_missing_source() {
        let missing = temp_path("does_not_exist");
        assert!(matches!(
            GdalBackend::default().open(&missing),
            Err(ReclassifyError::SourceUnreadable { .. })
        ));
    }

    #[test]
    fn test_create_in_missing_directory() {
        let path = std::env::temp_dir()
            .join(format!("geotiff_reclassify_missing_{}", std::process::id()))
            .join("out.tif");
        let spec = OutputSpec {
            width: 4,
            height: 4,
            dtype: PixelType::UInt8,
            band_names: vec!["di".to_string()],
            nodata: None,
            georeference: None,
        };
        assert!(matches!(
            GdalBackend::default().create(&path, &spec),
            Err(ReclassifyError::DestinationUnwritable { .. })
        ));
    }

    #[test]
    fn test_finish_closes_readable_file() {
        let path = temp_path("finish");
        let spec = OutputSpec {
            width: 4,
            height: 2,
            dtype: PixelType::UInt16,
            band_names: vec!["di".to_string()],
            nodata: Some(0.0),
            georeference: None,
        };
        let mut sink = GdalBackend::default().create(&path, &spec).unwrap();
        sink.write(1, &Window::new(0, 0, 4, 2), &Array2::from_elem((2, 4), 300.0))
            .unwrap();
        sink.finish().unwrap();

        let (_, data) = read_band(&path, 1);
        assert_eq!(data, Array2::from_elem((2, 4), 300.0));
        let _ = std::fs::remove_file(&path);
    }
}
